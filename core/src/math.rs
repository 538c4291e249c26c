//! Math type aliases, projection matrices and std140 packing helpers.
//!
//! Conventions used throughout umbra:
//! - right-handed coordinates, the camera looks down its local `-Z` axis
//! - clip-space depth is in `[0, 1]`, so every projection maps the
//!   negative-Z half-volume of view space onto that range
//! - matrices are column-major when laid out in GPU memory

pub use nalgebra;

/// 2D vector (f32).
pub type Vec2 = nalgebra::Vector2<f32>;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32).
pub type Vec4 = nalgebra::Vector4<f32>;

/// 3x3 matrix (f32).
pub type Mat3 = nalgebra::Matrix3<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

/// 3D point (f32).
pub type Point3 = nalgebra::Point3<f32>;

/// Unit quaternion (f32).
pub type Rotation = nalgebra::UnitQuaternion<f32>;

/// Rigid transform (rotation + translation, f32).
pub type Isometry3 = nalgebra::Isometry3<f32>;

/// Granularity used when rounding shadow-fitting radii up.
///
/// Rounding keeps the light-space box stable from frame to frame so shadow
/// texels do not shimmer while the camera moves.
pub const SHADOW_RADIUS_GRANULARITY: f32 = 1.0 / 16.0;

/// Round `value` up to the next multiple of `granularity`.
pub fn round_up_to(value: f32, granularity: f32) -> f32 {
    debug_assert!(granularity > 0.0);
    (value / granularity).ceil() * granularity
}

/// Build a right-handed perspective projection with depth range [0, 1].
pub fn perspective_rh(yfov: f32, aspect: f32, znear: f32, zfar: f32) -> Mat4 {
    let f = 1.0 / (yfov / 2.0).tan();
    let nf = 1.0 / (znear - zfar);
    #[rustfmt::skip]
    let result = Mat4::new(
        f / aspect, 0.0, 0.0,       0.0,
        0.0,        f,   0.0,       0.0,
        0.0,        0.0, zfar * nf, znear * zfar * nf,
        0.0,        0.0, -1.0,      0.0,
    );
    result
}

/// Centered orthographic projection of a `sizes.x` by `sizes.y` box.
///
/// View-space depths `-near` and `-far` map to 0 and 1.
pub fn orthographic_matrix(sizes: Vec2, near: f32, far: f32) -> Mat4 {
    let sz = 1.0 / (near - far);
    #[rustfmt::skip]
    let result = Mat4::new(
        2.0 / sizes.x, 0.0,           0.0, 0.0,
        0.0,           2.0 / sizes.y, 0.0, 0.0,
        0.0,           0.0,           sz,  near * sz,
        0.0,           0.0,           0.0, 1.0,
    );
    result
}

/// Orthographic projection used by the shadow fitting path.
///
/// `z_min`/`z_max` bound the light-space box; the scale is
/// `1 / (z_min - z_max)` and the offset recentres the box so that with the
/// light placed one radius behind the scene the whole box lands in `[0, 1]`.
pub fn shadow_orthographic_matrix(sizes: Vec2, z_min: f32, z_max: f32) -> Mat4 {
    let sx = 2.0 / sizes.x;
    let sy = 2.0 / sizes.y;
    let sz = 1.0 / (z_min - z_max);
    let pz = -0.5 * (z_min + z_max) * sz;
    #[rustfmt::skip]
    let result = Mat4::new(
        sx,  0.0, 0.0, 0.0,
        0.0, sy,  0.0, 0.0,
        0.0, 0.0, sz,  pz,
        0.0, 0.0, 0.0, 1.0,
    );
    result
}

/// Right-handed view transform looking from `eye` towards `target`.
pub fn look_at(eye: &Vec3, target: &Vec3, up: &Vec3) -> Isometry3 {
    Isometry3::look_at_rh(&Point3::from(*eye), &Point3::from(*target), up)
}

/// Pick an up vector that is not parallel to `direction`, preferring `+Z`.
pub fn stable_up_vector(direction: &Vec3) -> Vec3 {
    let dir = direction.normalize();
    if dir.z.abs() > 0.999 {
        Vec3::y()
    } else {
        Vec3::z()
    }
}

/// Inverse-transpose of the upper-left 3x3 block, used to transform normals.
///
/// Falls back to the plain 3x3 block when the matrix is singular.
pub fn normal_matrix(model_view: &Mat4) -> Mat3 {
    let linear: Mat3 = model_view.fixed_view::<3, 3>(0, 0).into_owned();
    linear
        .try_inverse()
        .map(|inv| inv.transpose())
        .unwrap_or(linear)
}

/// Convert a 4x4 matrix to a column-major `[[f32; 4]; 4]` array.
pub fn mat4_to_cols_array_2d(m: &Mat4) -> [[f32; 4]; 4] {
    let s = m.as_slice();
    [
        [s[0], s[1], s[2], s[3]],
        [s[4], s[5], s[6], s[7]],
        [s[8], s[9], s[10], s[11]],
        [s[12], s[13], s[14], s[15]],
    ]
}

/// Convert a 3x3 matrix to std140 layout: three columns, each padded to 16 bytes.
pub fn mat3_to_padded_cols(m: &Mat3) -> [[f32; 4]; 3] {
    [
        [m[(0, 0)], m[(1, 0)], m[(2, 0)], 0.0],
        [m[(0, 1)], m[(1, 1)], m[(2, 1)], 0.0],
        [m[(0, 2)], m[(1, 2)], m[(2, 2)], 0.0],
    ]
}

/// Pad a 3-vector to std140's 16-byte alignment.
pub fn vec3_to_padded(v: &Vec3) -> [f32; 4] {
    [v.x, v.y, v.z, 0.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_round_up_to_sixteenth() {
        assert_eq!(round_up_to(1.0, SHADOW_RADIUS_GRANULARITY), 1.0);
        assert_eq!(round_up_to(1.01, SHADOW_RADIUS_GRANULARITY), 1.0625);
        assert_eq!(round_up_to(0.0, SHADOW_RADIUS_GRANULARITY), 0.0);
    }

    #[test]
    fn test_shadow_ortho_entries() {
        let proj = shadow_orthographic_matrix(Vec2::new(10.0, 10.0), -5.0, 5.0);
        assert_eq!(proj[(0, 0)], 0.2);
        assert_eq!(proj[(1, 1)], 0.2);
        assert_eq!(proj[(2, 2)], -0.1);
        assert_eq!(proj[(2, 3)], 0.0);
        assert_eq!(proj[(3, 3)], 1.0);
    }

    #[test]
    fn test_shadow_ortho_matches_plain_ortho() {
        let r = 3.25;
        let shadow = shadow_orthographic_matrix(Vec2::new(2.0 * r, 2.0 * r), -r, r);
        let plain = orthographic_matrix(Vec2::new(2.0 * r, 2.0 * r), 0.0, 2.0 * r);
        assert_relative_eq!(shadow, plain, epsilon = 1e-7);
    }

    #[test]
    fn test_orthographic_depth_range() {
        let proj = orthographic_matrix(Vec2::new(4.0, 4.0), 0.5, 10.0);
        let near = proj * Vec4::new(0.0, 0.0, -0.5, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -10.0, 1.0);
        assert_relative_eq!(near.z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_perspective_depth_range() {
        let proj = perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let near = proj * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_look_at_puts_target_on_negative_z() {
        let view = look_at(&Vec3::new(0.0, -5.0, 0.0), &Vec3::zeros(), &Vec3::z());
        let p = view * Point3::origin();
        assert_relative_eq!(p.coords, Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-6);
    }

    #[test]
    fn test_normal_matrix_uniform_scale() {
        let m = Mat4::new_scaling(2.0);
        let n = normal_matrix(&m);
        assert_relative_eq!(n, Mat3::identity() * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_mat3_padding_layout() {
        let m = Mat3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0);
        let cols = mat3_to_padded_cols(&m);
        assert_eq!(cols[0], [1.0, 4.0, 7.0, 0.0]);
        assert_eq!(cols[2], [3.0, 6.0, 9.0, 0.0]);
    }

    #[test]
    fn test_mat4_to_cols_array_2d_translation() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let cols = mat4_to_cols_array_2d(&m);
        assert_eq!(cols[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
