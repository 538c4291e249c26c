//! # umbra demos
//!
//! Demo applications for the umbra renderer.
//!
//! ## Available Demos
//!
//! - `shadow_demo` - a small robot arm on a floor with shadows, SSAO and
//!   debug overlays, orbited with the mouse

use umbra_core::material::PbrMaterialData;
use umbra_core::math::{Isometry3, Mat4, Rotation, Vec3, Vec4};
use umbra_core::mesh::MeshData;
use umbra_core::mesh::generators::{generate_cuboid, generate_plane, generate_sphere};
use umbra_graphics::GraphicsError;
use umbra_graphics::scene::{GeometryKind, ObjectId, RobotScene};

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Length of one arm link in meters.
pub const LINK_LENGTH: f32 = 0.6;

/// World transforms of a `count`-link serial arm at time `t`, base first.
///
/// The base yaws about Z by `t`; every further joint pitches about its
/// parent's Y axis and sits `link_length` above it.
pub fn arm_link_transforms(count: usize, link_length: f32, t: f32) -> Vec<Mat4> {
    let mut pose = Isometry3::identity();
    (0..count)
        .map(|i| {
            let (offset, joint) = if i == 0 {
                (0.0, Rotation::from_axis_angle(&Vec3::z_axis(), t))
            } else {
                let angle = 0.6 * (t * (1.0 + i as f32 * 0.3)).sin();
                (link_length, Rotation::from_axis_angle(&Vec3::y_axis(), angle))
            };
            pose *= Isometry3::from_parts(Vec3::new(0.0, 0.0, offset).into(), joint);
            pose.to_homogeneous()
        })
        .collect()
}

/// Object ids of the demo arm, base first.
#[derive(Debug, Clone)]
pub struct DemoArm {
    pub links: Vec<ObjectId>,
}

impl DemoArm {
    /// Pose every link of the arm in `scene` for time `t`.
    pub fn update(&self, scene: &mut RobotScene, t: f32) {
        let transforms = arm_link_transforms(self.links.len(), LINK_LENGTH, t);
        for (id, transform) in self.links.iter().zip(transforms) {
            scene.set_transform(*id, transform);
        }
    }
}

/// A box along the link axis with a sphere at the joint.
fn link_meshes(color: Vec4) -> Vec<MeshData> {
    let material = PbrMaterialData::default()
        .with_base_color(color)
        .with_roughness(0.4);
    vec![
        generate_cuboid(
            Vec3::new(-0.08, -0.08, 0.0),
            Vec3::new(0.08, 0.08, LINK_LENGTH),
            color,
        )
        .with_material(material),
        generate_sphere(0.11, 16, 8).with_material(material),
    ]
}

/// Fill `scene` with a floor and a `links`-segment arm.
pub fn populate_demo_scene(scene: &mut RobotScene, links: usize) -> Result<DemoArm, GraphicsError> {
    scene.add_environment_object(
        generate_plane(4.0, Vec4::new(0.55, 0.55, 0.6, 1.0)),
        Mat4::identity(),
        GeometryKind::TriangleMesh,
    )?;

    let palette = [
        Vec4::new(0.85, 0.35, 0.2, 1.0),
        Vec4::new(0.9, 0.75, 0.25, 1.0),
        Vec4::new(0.3, 0.6, 0.85, 1.0),
    ];
    let mut ids = Vec::with_capacity(links);
    for i in 0..links {
        let meshes = link_meshes(palette[i % palette.len()]);
        ids.push(scene.add_geometry(GeometryKind::TriangleMesh, &meshes, Mat4::identity())?);
    }
    let arm = DemoArm { links: ids };
    arm.update(scene, 0.0);
    log::info!("demo scene: floor and {links}-link arm");
    Ok(arm)
}
