use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use umbra_core::bounds::Aabb;
use umbra_core::camera::Camera;
use umbra_core::light::DirectionalLight;
use umbra_core::math::{Mat4, Vec3};
use umbra_core::mesh::MeshData;
use umbra_core::mesh::generators::{generate_cube, generate_sphere};
use umbra_graphics::effects::ssao::generate_ssao_kernel;
use umbra_graphics::mesh::create_and_upload_mesh;
use umbra_graphics::passes::{
    DepthPassConfig, DepthPassInfo, ShadowPassConfig, fit_shadow_to_aabb, render_depth_pass_into,
};
use umbra_graphics::scene::{GeometryKind, RobotScene, RobotSceneConfig, Scene};
use umbra_graphics::uniforms::DepthUniforms;
use umbra_graphics::{
    BufferDescriptor, BufferUsage, Device, DeviceDescriptor, MeshGroup, RenderWindow, Renderer,
    TextureDescriptor, TextureFormat, TextureUsage,
};

fn dummy_device() -> Arc<Device> {
    Device::new(DeviceDescriptor::dummy()).unwrap()
}

fn test_camera() -> Camera {
    Camera::perspective_looking_at(
        1.0,
        1.0,
        0.1,
        50.0,
        Vec3::new(3.0, -4.0, 3.0),
        Vec3::zeros(),
    )
}

// ---------------------------------------------------------------------------
// Dummy backend resource creation
// ---------------------------------------------------------------------------

fn bench_dummy_create_buffer(c: &mut Criterion) {
    let device = dummy_device();
    c.bench_function("dummy_create_buffer_1kb", |b| {
        b.iter(|| {
            black_box(
                device
                    .create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))
                    .unwrap(),
            );
        });
    });
}

fn bench_dummy_create_texture(c: &mut Criterion) {
    let device = dummy_device();
    c.bench_function("dummy_create_texture_256x256", |b| {
        b.iter(|| {
            black_box(
                device
                    .create_texture(&TextureDescriptor::new_2d(
                        256,
                        256,
                        TextureFormat::Rgba8Unorm,
                        TextureUsage::TEXTURE_BINDING,
                    ))
                    .unwrap(),
            );
        });
    });
}

// ---------------------------------------------------------------------------
// Mesh upload
// ---------------------------------------------------------------------------

fn bench_upload_sphere(c: &mut Criterion) {
    let device = dummy_device();
    let sphere = generate_sphere(1.0, 32, 16);
    c.bench_function("dummy_upload_sphere_32x16", |b| {
        b.iter(|| black_box(create_and_upload_mesh(&device, &sphere).unwrap()));
    });
}

fn bench_mesh_group_16_cubes(c: &mut Criterion) {
    let device = dummy_device();
    let cubes: Vec<MeshData> = (0..16).map(|_| generate_cube()).collect();
    let views: Vec<_> = cubes.iter().map(MeshData::as_view).collect();
    c.bench_function("dummy_mesh_group_16_cubes", |b| {
        b.iter(|| black_box(MeshGroup::create_and_upload(&device, &views).unwrap()));
    });
}

// ---------------------------------------------------------------------------
// Depth and shadow passes
// ---------------------------------------------------------------------------

fn bench_depth_pass_sphere(c: &mut Criterion) {
    let device = dummy_device();
    let sphere = generate_sphere(0.8, 32, 16);
    let mesh = create_and_upload_mesh(&device, &sphere).unwrap();
    let target = device
        .create_texture(&TextureDescriptor::new_2d(
            128,
            128,
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT,
        ))
        .unwrap();
    let info = DepthPassInfo::with_target(&device, target, &DepthPassConfig::default()).unwrap();
    let mvp = DepthUniforms::from_mvp(&test_camera().view_proj());
    let view = mesh.view();

    c.bench_function("dummy_depth_pass_sphere_128x128", |b| {
        b.iter(|| {
            let mut cmd = device.acquire_command_buffer();
            render_depth_pass_into(&mut cmd, &info, "bench", [(&view, mvp)]).unwrap();
            cmd.submit().unwrap();
        });
    });
}

fn bench_shadow_fit(c: &mut Criterion) {
    let bounds = Aabb::new(Vec3::new(-3.0, -2.0, 0.0), Vec3::new(4.0, 1.5, 2.5));
    let light = DirectionalLight::default();
    c.bench_function("shadow_fit_to_aabb", |b| {
        b.iter(|| black_box(fit_shadow_to_aabb(black_box(&bounds), &light).unwrap()));
    });
}

fn bench_ssao_kernel(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    c.bench_function("ssao_kernel_generation", |b| {
        b.iter(|| black_box(generate_ssao_kernel(&mut rng)));
    });
}

// ---------------------------------------------------------------------------
// Scene frames
// ---------------------------------------------------------------------------

fn bench_robot_scene_frame(c: &mut Criterion) {
    let device = dummy_device();
    let mut renderer = Renderer::new(device, RenderWindow::headless(64, 64)).unwrap();
    let mut scene = RobotScene::new(
        &renderer,
        RobotSceneConfig::default()
            .with_prepass(true)
            .with_shadow_config(ShadowPassConfig::default().with_size(256, 256)),
    )
    .unwrap();
    for i in 0..8 {
        let offset = Mat4::new_translation(&Vec3::new(i as f32 * 1.5 - 6.0, 0.0, 0.0));
        scene
            .add_geometry(GeometryKind::TriangleMesh, &[generate_cube()], offset)
            .unwrap();
    }
    let camera = test_camera();

    c.bench_function("dummy_robot_scene_frame_8_cubes", |b| {
        b.iter(|| {
            renderer.begin_frame().unwrap();
            if renderer.wait_and_acquire_swapchain().unwrap() {
                scene.render(&mut renderer, &camera).unwrap();
            }
            renderer.end_frame().unwrap();
        });
    });
    scene.release();
}

criterion_group!(
    benches,
    bench_dummy_create_buffer,
    bench_dummy_create_texture,
    bench_upload_sphere,
    bench_mesh_group_16_cubes,
    bench_depth_pass_sphere,
    bench_shadow_fit,
    bench_ssao_kernel,
    bench_robot_scene_frame,
);
criterion_main!(benches);
