use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use umbra_core::bounds::{Aabb, frustum_bounding_sphere};
use umbra_core::camera::{Camera, CylindricalCamera};
use umbra_core::math::{Vec2, Vec3};
use umbra_core::mesh::{MeshLayout, VertexAttrib, VertexElementFormat};

// ---------------------------------------------------------------------------
// Camera math
// ---------------------------------------------------------------------------

fn test_camera() -> Camera {
    Camera::perspective_looking_at(
        1.0,
        16.0 / 9.0,
        0.1,
        100.0,
        Vec3::new(4.0, -6.0, 3.0),
        Vec3::zeros(),
    )
}

fn bench_view_proj(c: &mut Criterion) {
    let camera = test_camera();
    c.bench_function("camera_view_proj", |b| {
        b.iter(|| black_box(black_box(&camera).view_proj()));
    });
}

fn bench_frustum_bounding_sphere(c: &mut Criterion) {
    let camera = test_camera();
    c.bench_function("camera_frustum_bounding_sphere", |b| {
        b.iter(|| {
            let corners = black_box(&camera).world_frustum_corners();
            black_box(corners.map(|c| frustum_bounding_sphere(&c)))
        });
    });
}

fn bench_viewport_drag(c: &mut Criterion) {
    let mut cam = CylindricalCamera::new(test_camera());
    cam.look_at(&Vec3::new(4.0, -6.0, 3.0), &Vec3::zeros());
    c.bench_function("cylindrical_camera_viewport_drag", |b| {
        b.iter(|| {
            cam.viewport_drag(black_box(Vec2::new(0.01, 0.02)), 1.0, 0.5, false);
        });
    });
}

fn bench_aabb_transform(c: &mut Criterion) {
    let aabb = Aabb::new(Vec3::new(-1.0, -2.0, 0.0), Vec3::new(1.0, 2.0, 3.0));
    let camera = test_camera();
    let m = camera.view_matrix();
    c.bench_function("aabb_transformed", |b| {
        b.iter(|| black_box(black_box(&aabb).transformed(&m)));
    });
}

// ---------------------------------------------------------------------------
// Vertex layout construction
// ---------------------------------------------------------------------------

fn bench_mesh_layout_build(c: &mut Criterion) {
    c.bench_function("mesh_layout_build", |b| {
        b.iter(|| {
            black_box(
                MeshLayout::new()
                    .add_binding(0, 48)
                    .add_attribute(VertexAttrib::Position, 0, VertexElementFormat::Float3, 0)
                    .add_attribute(VertexAttrib::Normal, 0, VertexElementFormat::Float3, 12)
                    .add_attribute(VertexAttrib::Tangent, 0, VertexElementFormat::Float4, 24)
                    .add_attribute(VertexAttrib::TexCoord0, 0, VertexElementFormat::Float2, 40),
            )
        });
    });
}

fn bench_vertex_input_state(c: &mut Criterion) {
    let layout = MeshLayout::new()
        .add_binding(0, 32)
        .add_binding(1, 8)
        .add_attribute(VertexAttrib::Position, 0, VertexElementFormat::Float3, 0)
        .add_attribute(VertexAttrib::Normal, 0, VertexElementFormat::Float3, 16)
        .add_attribute(VertexAttrib::TexCoord0, 1, VertexElementFormat::Float2, 0);
    c.bench_function("mesh_layout_to_vertex_input_state", |b| {
        b.iter(|| black_box(black_box(&layout).to_vertex_input_state()));
    });
}

criterion_group!(
    benches,
    bench_view_proj,
    bench_frustum_bounding_sphere,
    bench_viewport_drag,
    bench_aabb_transform,
    bench_mesh_layout_build,
    bench_vertex_input_state,
);
criterion_main!(benches);
