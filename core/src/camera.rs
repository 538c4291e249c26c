//! Camera state and camera controls.
//!
//! A [`Camera`] is a projection matrix plus a rigid view transform. Derived
//! quantities (pose, view-projection, basis vectors) are recomputed on every
//! call so they always reflect the latest control operation.
//!
//! Controls are free functions in [`controls`] that mutate a camera, and
//! [`CylindricalCamera`], which orbits a target point around the world Z axis.

use crate::bounds::{Corners, frustum_corners_from_projection};
use crate::math::{Isometry3, Mat4, Point3, Rotation, Vec2, Vec3, look_at, perspective_rh};

/// Projection matrix and view transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Projection matrix `P`.
    pub projection: Mat4,
    /// View transform `V` (world to camera).
    pub view: Isometry3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::identity(),
            view: Isometry3::identity(),
        }
    }
}

impl Camera {
    pub fn new(projection: Mat4, view: Isometry3) -> Self {
        Self { projection, view }
    }

    /// Perspective camera at `eye` looking at `target`, with `+Z` up.
    pub fn perspective_looking_at(
        yfov: f32,
        aspect: f32,
        znear: f32,
        zfar: f32,
        eye: Vec3,
        target: Vec3,
    ) -> Self {
        Self {
            projection: perspective_rh(yfov, aspect, znear, zfar),
            view: look_at(&eye, &target, &Vec3::z()),
        }
    }

    /// Camera pose `M = V^-1` (camera to world).
    pub fn pose(&self) -> Isometry3 {
        self.view.inverse()
    }

    /// World-space camera position.
    pub fn position(&self) -> Vec3 {
        self.pose().translation.vector
    }

    /// View matrix `V` as a homogeneous 4x4 matrix.
    pub fn view_matrix(&self) -> Mat4 {
        self.view.to_homogeneous()
    }

    /// View-projection matrix `P * V`.
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view.to_homogeneous()
    }

    /// Transform a world-space direction to view space.
    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        self.view.rotation * v
    }

    /// Transform a world-space point to view space.
    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        (self.view * Point3::from(*p)).coords
    }

    /// World-space right vector.
    pub fn right(&self) -> Vec3 {
        self.view.rotation.inverse() * Vec3::x()
    }

    /// World-space up vector.
    pub fn up(&self) -> Vec3 {
        self.view.rotation.inverse() * Vec3::y()
    }

    /// World-space viewing direction.
    pub fn forward(&self) -> Vec3 {
        -(self.view.rotation.inverse() * Vec3::z())
    }

    /// World-space corners of the view frustum.
    pub fn world_frustum_corners(&self) -> Option<Corners> {
        let corners = frustum_corners_from_projection(&self.projection)?;
        let pose = self.pose();
        Some(corners.map(|c| (pose * Point3::from(c)).coords))
    }
}

/// Camera control functions.
///
/// All of them keep the view rotation a unit quaternion, renormalizing after
/// composing rotations so repeated increments do not drift.
pub mod controls {
    use super::*;

    /// Rotate around the world origin, about the camera's local X axis.
    pub fn local_rotate_x_around_origin(camera: &mut Camera, angle: f32) {
        let r = Rotation::from_axis_angle(&Vec3::x_axis(), angle);
        camera.view.rotation = r * camera.view.rotation;
        camera.view.rotation.renormalize();
    }

    /// Rotate the camera by the world-frame rotation `rotation` around the point `p`.
    pub fn rotate_around_point(camera: &mut Camera, rotation: &Rotation, p: &Vec3) {
        let to_origin = Isometry3::translation(-p.x, -p.y, -p.z);
        let back = Isometry3::translation(p.x, p.y, p.z);
        let rot = Isometry3::from_parts(nalgebra::Translation3::identity(), rotation.inverse());
        camera.view = camera.view * back * rot * to_origin;
        camera.view.rotation.renormalize();
    }

    /// Rotate the camera around the vertical axis through `p`.
    pub fn rotate_z_around_point(camera: &mut Camera, angle: f32, p: &Vec3) {
        let r = Rotation::from_axis_angle(&Vec3::z_axis(), angle);
        rotate_around_point(camera, &r, p);
    }

    /// Move the camera by `tr` expressed in its own frame.
    pub fn local_translate(camera: &mut Camera, tr: &Vec3) {
        camera.view.translation.vector -= tr;
    }

    /// Move the camera by `tr` expressed in the world frame.
    pub fn world_translate(camera: &mut Camera, tr: &Vec3) {
        camera.view.translation.vector -= camera.view.rotation * tr;
    }

    /// Place the camera at `pos` without changing its orientation.
    pub fn set_world_position(camera: &mut Camera, pos: &Vec3) {
        camera.view.translation.vector = -(camera.view.rotation * pos);
    }
}

/// Camera orbiting a target point, with the world Z axis as the vertical.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CylindricalCamera {
    pub camera: Camera,
    pub target: Vec3,
}

impl CylindricalCamera {
    /// Default for the `y_invert` flag of [`viewport_drag`](Self::viewport_drag).
    pub const DEFAULT_Y_INVERT: bool = false;

    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            target: Vec3::zeros(),
        }
    }

    /// Look at `target` from `eye`.
    pub fn look_at(&mut self, eye: &Vec3, target: &Vec3) -> &mut Self {
        self.target = *target;
        self.camera.view = look_at(eye, target, &Vec3::z());
        self
    }

    /// Look at `target` from the current position.
    pub fn look_at_from_current(&mut self, target: &Vec3) -> &mut Self {
        self.target = *target;
        self.camera.view = look_at(&self.camera.position(), target, &Vec3::z());
        self
    }

    /// Move camera and target by a world-space offset.
    pub fn translate(&mut self, tr: &Vec3) -> &mut Self {
        self.target += tr;
        controls::world_translate(&mut self.camera, tr);
        self
    }

    /// Move camera and target by an offset in the camera frame.
    pub fn local_translate(&mut self, tr: &Vec3) -> &mut Self {
        self.target += self.camera.view.rotation.inverse() * tr;
        controls::local_translate(&mut self.camera, tr);
        self
    }

    /// Move up or down along world Z.
    pub fn dolly(&mut self, height: f32) -> &mut Self {
        self.translate(&Vec3::new(0.0, 0.0, height))
    }

    /// Rotate around the vertical axis through the target.
    pub fn orbit(&mut self, angle: f32) -> &mut Self {
        let target = self.target;
        controls::rotate_z_around_point(&mut self.camera, angle, &target);
        self
    }

    /// Mouse-drag control: horizontal motion orbits, vertical motion dollies.
    pub fn viewport_drag(
        &mut self,
        step: Vec2,
        rot_sensitivity: f32,
        pan_sensitivity: f32,
        y_invert: bool,
    ) -> &mut Self {
        let rot_step = step.x * rot_sensitivity;
        let pan_step = step.y * pan_sensitivity;
        let y_step = if y_invert { -pan_step } else { pan_step };
        self.dolly(y_step).orbit(rot_step)
    }

    /// Slide camera and target in the image plane. `step` is in screen
    /// coordinates (Y down).
    pub fn pan(&mut self, step: Vec2, sensitivity: f32) -> &mut Self {
        let tr = Vec3::new(-step.x, step.y, 0.0) * sensitivity;
        self.local_translate(&tr)
    }

    /// Zoom towards (positive `offset`) or away from the target by `scale`.
    pub fn move_in_out(&mut self, scale: f32, offset: f32) -> &mut Self {
        let alpha = 1.0 - if offset > 0.0 { 1.0 / scale } else { scale };
        let distance = (self.camera.position() - self.target).norm();
        controls::local_translate(&mut self.camera, &Vec3::new(0.0, 0.0, -distance * alpha));
        self
    }
}

impl AsRef<Camera> for CylindricalCamera {
    fn as_ref(&self) -> &Camera {
        &self.camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_camera() -> Camera {
        Camera::perspective_looking_at(
            1.0,
            16.0 / 9.0,
            0.1,
            50.0,
            Vec3::new(3.0, -4.0, 2.0),
            Vec3::new(0.0, 0.0, 0.5),
        )
    }

    fn assert_orthonormal(camera: &Camera) {
        let r = camera.view.rotation.to_rotation_matrix().into_inner();
        assert_relative_eq!(r * r.transpose(), crate::math::Mat3::identity(), epsilon = 1e-5);
    }

    #[test]
    fn test_pose_is_view_inverse() {
        let camera = test_camera();
        assert_relative_eq!(
            camera.pose().to_homogeneous(),
            camera.view.to_homogeneous().try_inverse().unwrap(),
            epsilon = 1e-5
        );
        assert_relative_eq!(
            camera.view.inverse().inverse().to_homogeneous(),
            camera.view.to_homogeneous(),
            epsilon = 1e-5
        );
        assert_relative_eq!(camera.position(), Vec3::new(3.0, -4.0, 2.0), epsilon = 1e-5);
    }

    #[test]
    fn test_basis_vectors() {
        let camera = test_camera();
        let expected_forward = (Vec3::new(0.0, 0.0, 0.5) - Vec3::new(3.0, -4.0, 2.0)).normalize();
        assert_relative_eq!(camera.forward(), expected_forward, epsilon = 1e-5);
        assert_relative_eq!(camera.right().dot(&camera.up()), 0.0, epsilon = 1e-6);
        assert_relative_eq!(camera.right().z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(camera.transform_vector(&camera.forward()), -Vec3::z(), epsilon = 1e-5);
    }

    #[test]
    fn test_transform_point_matches_view_proj() {
        let camera = test_camera();
        let p = Vec3::new(0.5, 0.25, 1.0);
        let view_space = camera.transform_point(&p);
        let clip = camera.view_proj() * p.push(1.0);
        let expected = camera.projection * view_space.push(1.0);
        assert_relative_eq!(clip, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_set_world_position() {
        let mut camera = test_camera();
        controls::set_world_position(&mut camera, &Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(camera.position(), Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_world_translate_moves_position() {
        let mut camera = test_camera();
        let before = camera.position();
        controls::world_translate(&mut camera, &Vec3::new(0.0, 0.0, 1.5));
        assert_relative_eq!(camera.position(), before + Vec3::new(0.0, 0.0, 1.5), epsilon = 1e-5);
    }

    #[test]
    fn test_local_translate_moves_along_forward() {
        let mut camera = test_camera();
        let before = camera.position();
        let forward = camera.forward();
        controls::local_translate(&mut camera, &Vec3::new(0.0, 0.0, -2.0));
        assert_relative_eq!(camera.position(), before + 2.0 * forward, epsilon = 1e-5);
    }

    #[test]
    fn test_orbit_keeps_distance_and_target() {
        let mut cam = CylindricalCamera::default();
        cam.camera = test_camera();
        cam.look_at(&Vec3::new(3.0, -4.0, 2.0), &Vec3::new(0.0, 0.0, 0.5));
        let dist = (cam.camera.position() - cam.target).norm();
        for _ in 0..1000 {
            cam.orbit(0.01);
        }
        assert_relative_eq!((cam.camera.position() - cam.target).norm(), dist, epsilon = 1e-3);
        assert_relative_eq!(cam.camera.position().z, 2.0, epsilon = 1e-3);
        assert_orthonormal(&cam.camera);
        let to_target = (cam.target - cam.camera.position()).normalize();
        assert_relative_eq!(cam.camera.forward(), to_target, epsilon = 1e-3);
    }

    #[test]
    fn test_rotations_stay_orthonormal() {
        let mut camera = test_camera();
        for i in 0..500 {
            controls::local_rotate_x_around_origin(&mut camera, 0.003 * i as f32);
            controls::rotate_z_around_point(&mut camera, -0.007, &Vec3::new(1.0, 1.0, 0.0));
        }
        assert_orthonormal(&camera);
        assert_relative_eq!(
            camera.pose().inverse().to_homogeneous(),
            camera.view.to_homogeneous(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_dolly_and_translate_move_target() {
        let mut cam = CylindricalCamera::default();
        cam.look_at(&Vec3::new(0.0, -5.0, 1.0), &Vec3::zeros());
        cam.dolly(2.0);
        assert_relative_eq!(cam.target, Vec3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(cam.camera.position(), Vec3::new(0.0, -5.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_local_translate_keeps_target_in_front() {
        let mut cam = CylindricalCamera::default();
        cam.look_at(&Vec3::new(0.0, -5.0, 0.0), &Vec3::zeros());
        cam.local_translate(&Vec3::new(1.0, 0.0, 0.0));
        let target_in_view = cam.camera.transform_point(&cam.target);
        assert_relative_eq!(target_in_view, Vec3::new(0.0, 0.0, -5.0), epsilon = 1e-5);
    }

    #[test]
    fn test_move_in_out() {
        let mut cam = CylindricalCamera::default();
        cam.look_at(&Vec3::new(0.0, -4.0, 0.0), &Vec3::zeros());
        cam.move_in_out(2.0, 1.0);
        assert_relative_eq!(cam.camera.position(), Vec3::new(0.0, -2.0, 0.0), epsilon = 1e-5);
        cam.move_in_out(2.0, -1.0);
        assert_relative_eq!(cam.camera.position(), Vec3::new(0.0, -4.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_viewport_drag_orbits_and_dollies() {
        let mut cam = CylindricalCamera::default();
        cam.look_at(&Vec3::new(0.0, -4.0, 0.0), &Vec3::zeros());
        cam.viewport_drag(
            Vec2::new(std::f32::consts::FRAC_PI_2, 1.0),
            1.0,
            0.5,
            CylindricalCamera::DEFAULT_Y_INVERT,
        );
        assert_relative_eq!(cam.target, Vec3::new(0.0, 0.0, 0.5), epsilon = 1e-6);
        assert_relative_eq!(cam.camera.position(), Vec3::new(4.0, 0.0, 0.5), epsilon = 1e-4);
    }

    #[test]
    fn test_world_frustum_corners_surround_forward() {
        let camera = test_camera();
        let corners = camera.world_frustum_corners().unwrap();
        let centroid = corners.iter().fold(Vec3::zeros(), |a, c| a + c) / 8.0;
        let dir = (centroid - camera.position()).normalize();
        assert!(dir.dot(&camera.forward()) > 0.99);
    }
}
