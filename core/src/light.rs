//! Light sources.

use crate::math::Vec3;

/// A light infinitely far away, shining along `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// World-space direction the light travels in. Need not be normalized.
    pub direction: Vec3,
    /// Linear RGB.
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.0, -1.0, -1.0),
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 4.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction,
            color,
            intensity,
        }
    }

    /// Unit direction, or `-Z` when `direction` is zero.
    pub fn normalized_direction(&self) -> Vec3 {
        self.direction
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| -Vec3::z())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_direction_falls_back_to_down() {
        let light = DirectionalLight::new(Vec3::zeros(), Vec3::x(), 1.0);
        assert_eq!(light.normalized_direction(), -Vec3::z());
        let light = DirectionalLight::new(Vec3::new(0.0, 3.0, 4.0), Vec3::x(), 1.0);
        assert_eq!(light.normalized_direction(), Vec3::new(0.0, 0.6, 0.8));
    }
}
