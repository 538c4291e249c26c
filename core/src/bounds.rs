//! Bounding volumes and frustum helpers.

use crate::math::{Mat3, Mat4, Vec3, Vec4};

/// Eight corners of a box or frustum.
///
/// Corner `i` takes the min/max value along X, Y and Z from bits 0, 1 and 2 of `i`.
pub type Corners = [Vec3; 8];

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    /// An empty box that grows to fit whatever is added to it.
    fn default() -> Self {
        Self {
            min: Vec3::repeat(f32::MAX),
            max: Vec3::repeat(f32::MIN),
        }
    }
}

impl Aabb {
    /// Box spanning the two points, in any order.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.inf(&b),
            max: a.sup(&b),
        }
    }

    /// Smallest box containing every point.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut aabb = Self::default();
        for p in points {
            aabb.grow_to_point(p);
        }
        aabb
    }

    /// Whether nothing has been added to this box yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    /// Box sizes along the axes.
    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn depth(&self) -> f32 {
        self.max.z - self.min.z
    }

    /// Half the length of the diagonal: radius of the sphere centred on the box
    /// that passes through all eight corners.
    pub fn radius(&self) -> f32 {
        0.5 * self.extents().norm()
    }

    pub fn grow_to_point(&mut self, p: &Vec3) -> &mut Self {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
        self
    }

    /// Grow this box to also contain `other`.
    pub fn merge(&mut self, other: &Aabb) -> &mut Self {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
        self
    }

    /// Pad the box by `delta` on every side.
    pub fn grow(&mut self, delta: f32) -> &mut Self {
        debug_assert!(delta >= 0.0);
        self.min.add_scalar_mut(-delta);
        self.max.add_scalar_mut(delta);
        self
    }

    pub fn contains(&self, p: &Vec3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn corners(&self) -> Corners {
        let ab = [self.min, self.max];
        std::array::from_fn(|i| {
            Vec3::new(ab[i & 1].x, ab[(i >> 1) & 1].y, ab[(i >> 2) & 1].z)
        })
    }

    /// Axis-aligned box of this box after an affine transform.
    pub fn transformed(&self, transform: &Mat4) -> Aabb {
        let corners = self.corners().map(|c| transform.transform_point(&c.into()).coords);
        Aabb::from_points(corners.iter())
    }
}

/// Oriented bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    /// Box axes as matrix columns.
    pub axes: Mat3,
    pub center: Vec3,
    /// Half-sizes along each axis.
    pub half_extents: Vec3,
}

impl Obb {
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self {
            axes: Mat3::identity(),
            center: aabb.center(),
            half_extents: 0.5 * aabb.extents(),
        }
    }

    /// Apply a rigid transform.
    pub fn transformed(&self, transform: &Mat4) -> Obb {
        let r: Mat3 = transform.fixed_view::<3, 3>(0, 0).into_owned();
        let t: Vec3 = transform.fixed_view::<3, 1>(0, 3).into_owned();
        Obb {
            axes: r * self.axes,
            center: r * self.center + t,
            half_extents: self.half_extents,
        }
    }

    pub fn to_aabb(&self) -> Aabb {
        let mut min = self.center;
        let mut max = self.center;
        for i in 0..3 {
            let axis = (self.axes.column(i) * self.half_extents[i]).abs();
            min -= axis;
            max += axis;
        }
        Aabb { min, max }
    }

    /// Matrix mapping the `[-1, 1]` cube onto this box.
    pub fn to_transformation_matrix(&self) -> Mat4 {
        let mut m = Mat4::identity();
        let scaled = self.axes * Mat3::from_diagonal(&self.half_extents);
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&scaled);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.center);
        m
    }

    pub fn corners(&self) -> Corners {
        unit_cube_corners(&self.to_transformation_matrix(), [-1.0, 1.0])
    }
}

/// Map the corners of the cube `[z0, z1]`-in-depth, `[-1, 1]` in X/Y through
/// `transform` with a perspective divide.
fn unit_cube_corners(transform: &Mat4, z_range: [f32; 2]) -> Corners {
    std::array::from_fn(|i| {
        let x = if i & 1 == 0 { -1.0 } else { 1.0 };
        let y = if (i >> 1) & 1 == 0 { -1.0 } else { 1.0 };
        let z = z_range[(i >> 2) & 1];
        let p = transform * Vec4::new(x, y, z, 1.0);
        p.xyz() / p.w
    })
}

/// View-space corners of the frustum described by `projection`.
///
/// Corners 0..4 lie on the near plane (NDC depth 0), 4..8 on the far plane.
/// Returns `None` when the projection is not invertible.
pub fn frustum_corners_from_projection(projection: &Mat4) -> Option<Corners> {
    let inv = projection.try_inverse()?;
    Some(unit_cube_corners(&inv, [0.0, 1.0]))
}

/// Centroid of the corners and the largest distance from it to any corner.
pub fn frustum_bounding_sphere(corners: &Corners) -> (Vec3, f32) {
    let center = corners.iter().fold(Vec3::zeros(), |acc, c| acc + c) / 8.0;
    let radius = corners
        .iter()
        .map(|c| (c - center).norm())
        .fold(0.0_f32, f32::max);
    (center, radius)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{orthographic_matrix, perspective_rh, Vec2};
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_corners_cover_box() {
        let aabb = Aabb::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, -2.0, -3.0));
        let corners = aabb.corners();
        assert_eq!(corners[0], aabb.min);
        assert_eq!(corners[7], aabb.max);
        assert_eq!(corners[1], Vec3::new(1.0, -2.0, -3.0));
        assert_eq!(Aabb::from_points(corners.iter()), aabb);
    }

    #[test]
    fn test_aabb_radius_is_half_diagonal() {
        let aabb = Aabb::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 1.0));
        assert_relative_eq!(aabb.radius(), 1.5);
        assert_eq!(aabb.center(), Vec3::new(1.0, 1.0, 0.5));
    }

    #[test]
    fn test_default_aabb_is_empty_until_grown() {
        let mut aabb = Aabb::default();
        assert!(aabb.is_empty());
        aabb.grow_to_point(&Vec3::new(1.0, 1.0, 1.0));
        assert!(!aabb.is_empty());
        assert!(aabb.contains(&Vec3::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_obb_roundtrip_through_aabb() {
        let aabb = Aabb::new(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 1.0, 4.0));
        let obb = Obb::from_aabb(&aabb);
        let back = obb.to_aabb();
        assert_relative_eq!(back.min, aabb.min);
        assert_relative_eq!(back.max, aabb.max);
    }

    #[test]
    fn test_obb_corners_match_aabb_corners() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 3.0, 2.0));
        let obb = Obb::from_aabb(&aabb);
        for (a, b) in obb.corners().iter().zip(aabb.corners().iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_ortho_frustum_corners() {
        let proj = orthographic_matrix(Vec2::new(4.0, 2.0), 1.0, 5.0);
        let corners = frustum_corners_from_projection(&proj).unwrap();
        assert_relative_eq!(corners[0], Vec3::new(-2.0, -1.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(corners[7], Vec3::new(2.0, 1.0, -5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_bounding_sphere_contains_perspective_frustum() {
        let proj = perspective_rh(1.0, 1.5, 0.1, 10.0);
        let corners = frustum_corners_from_projection(&proj).unwrap();
        let (center, radius) = frustum_bounding_sphere(&corners);
        for c in &corners {
            assert!((c - center).norm() <= radius + 1e-5);
        }
        assert!(center.z < 0.0);
    }
}
