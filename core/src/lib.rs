//! # umbra core
//!
//! Backend-independent building blocks for the umbra renderer: math and
//! projection helpers, cameras and camera controls, bounding volumes, and the
//! CPU-side mesh data handed to the GPU upload path.

pub mod bounds;
pub mod camera;
pub mod light;
pub mod material;
pub mod math;
pub mod mesh;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
