//! End-to-end tests of the upload path, depth passes and scenes.
//!
//! Every test runs once per backend; unavailable backends are skipped.

mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use common::{Backend, TestContext, corner_triangle, position_strip};
use rstest::rstest;
use umbra_core::bounds::Aabb;
use umbra_core::camera::Camera;
use umbra_core::light::DirectionalLight;
use umbra_core::math::{Mat4, Point3, Vec2, Vec3, shadow_orthographic_matrix};
use umbra_core::mesh::generators::generate_cube;
use umbra_core::mesh::{
    ColorVertex, DefaultVertex, MeshData, MeshLayout, PositionVertex, PrimitiveTopology, Vertex,
};
use umbra_graphics::command::Command;
use umbra_graphics::mesh::{create_mesh, upload_mesh_to_device};
use umbra_graphics::passes::{
    DepthPassConfig, DepthPassInfo, ShadowPassConfig, fit_shadow_to_aabb, render_depth_pass_into,
};
use umbra_graphics::readback::{download_buffer, read_depth_texture};
use umbra_graphics::scene::{DebugScene, GeometryKind, RobotScene, RobotSceneConfig, Scene};
use umbra_graphics::shader::ShaderStage;
use umbra_graphics::types::CullMode;
use umbra_graphics::uniforms::DepthUniforms;
use umbra_graphics::{
    BufferDescriptor, BufferUsage, Device, DeviceDescriptor, GraphicsError, MeshGroup,
    RenderWindow, Renderer, TextureFormat,
};

// ============================================================================
// Layouts and pipelines
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_pipeline_vertex_input_matches_layout(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let renderer = ctx.renderer(8, 8);

    for layout in [
        PositionVertex::layout(),
        DefaultVertex::layout(),
        ColorVertex::layout(),
    ] {
        let config = DepthPassConfig::default().with_layout(layout.clone());
        let info = DepthPassInfo::create(&renderer, &config).unwrap();
        let input = &info.pipeline().descriptor().vertex_input;
        assert_eq!(input.bindings.len(), layout.num_bindings());
        for attribute in &input.attributes {
            assert!(
                layout.binding(attribute.binding).is_some(),
                "attribute {} references missing binding {}",
                attribute.location,
                attribute.binding
            );
        }
    }

    let debug = DebugScene::new(&renderer).unwrap();
    for (pipeline, layout) in [
        (debug.fill_pipeline(), DefaultVertex::layout()),
        (debug.line_pipeline(), ColorVertex::layout()),
    ] {
        let input = &pipeline.descriptor().vertex_input;
        assert_eq!(input.bindings.len(), layout.num_bindings());
        assert_eq!(input.attributes.len(), layout.num_attributes());
    }
}

// ============================================================================
// Upload and readback
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_upload_round_trip(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let device = &ctx.device;
    let vertices: Vec<DefaultVertex> = (0..5)
        .map(|i| {
            let f = i as f32;
            DefaultVertex::new([f, f * 2.0, -f], [0.0, 0.0, 1.0], [f / 5.0, 0.5, 1.0, 1.0])
        })
        .collect();
    let data = MeshData::new(PrimitiveTopology::TriangleList, &vertices, &[0, 1, 2, 2, 3, 4]);

    let mesh = ctx.upload(&data);
    let vertex_buffer = mesh.vertex_buffer(0).unwrap();
    let index_buffer = mesh.index_buffer().unwrap();
    let vertex_bytes = download_buffer(device, &vertex_buffer, 0, vertex_buffer.size()).unwrap();
    let index_bytes = download_buffer(device, &index_buffer, 0, index_buffer.size()).unwrap();

    assert_eq!(vertex_bytes, data.vertex_bytes());
    assert_eq!(index_bytes, data.index_bytes());
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_group_upload_round_trip(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let device = &ctx.device;
    let data = [position_strip(3), position_strip(5), position_strip(2)];
    let group = MeshGroup::from_mesh_data(device, &data).unwrap();
    let views: Vec<_> = data.iter().map(MeshData::as_view).collect();
    group.upload(&views).unwrap();

    let buffer = group.vertex_buffer();
    for (i, mesh) in data.iter().enumerate() {
        let len = mesh.vertex_bytes().len() as u64;
        let bytes = download_buffer(device, &buffer, group.vertex_offset(i), len).unwrap();
        assert_eq!(bytes, mesh.vertex_bytes(), "mesh {i} drifted");
    }
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_upload_into_released_mesh_fails(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let data = corner_triangle();
    let mut mesh = create_mesh(&ctx.device, &data).unwrap();
    mesh.release_owned_buffers();
    let result = upload_mesh_to_device(&ctx.device, &mesh, &data);
    assert!(matches!(result, Err(GraphicsError::InvalidState(_))));
}

// ============================================================================
// Ownership
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_release_is_idempotent(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let device = &ctx.device;
    let buffers = device.live_buffer_count();
    let textures = device.live_texture_count();

    let mut buffer = device
        .create_buffer(&BufferDescriptor::new(256, BufferUsage::VERTEX | BufferUsage::COPY_DST))
        .unwrap();
    let mut texture = ctx.depth_target(4, 4);
    let mut borrowed_buffer = buffer.share();
    let mut borrowed_texture = texture.share();

    borrowed_buffer.release();
    borrowed_texture.release();
    assert!(!buffer.is_released());
    assert!(!texture.is_released());
    assert_eq!(device.live_buffer_count(), buffers + 1);
    assert_eq!(device.live_texture_count(), textures + 1);

    buffer.release();
    buffer.release();
    texture.release();
    texture.release();
    assert!(borrowed_buffer.is_released());
    assert!(borrowed_texture.is_released());
    assert_eq!(device.live_buffer_count(), buffers);
    assert_eq!(device.live_texture_count(), textures);
}

// ============================================================================
// Mesh groups
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_group_offsets_are_prefix_sums(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let indexed = |n: u32| {
        let vertices: Vec<_> = (0..n).map(|i| PositionVertex::new(i as f32, 1.0, 0.0)).collect();
        let indices: Vec<u32> = (0..n).rev().collect();
        MeshData::new(PrimitiveTopology::TriangleList, &vertices, &indices)
    };
    let data = [indexed(3), indexed(6), indexed(9), indexed(3)];
    let group = MeshGroup::from_mesh_data(&ctx.device, &data).unwrap();

    let mut vertex_sum = 0;
    let mut index_sum = 0;
    for (i, mesh) in data.iter().enumerate() {
        assert_eq!(group.vertex_offset(i), vertex_sum);
        assert_eq!(group.index_offset(i), index_sum);
        vertex_sum += mesh.vertex_bytes().len() as u64;
        index_sum += mesh.index_bytes().len() as u64;
    }
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_second_group_mesh_starts_after_first(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let group =
        MeshGroup::from_mesh_data(&ctx.device, &[position_strip(4), position_strip(6)]).unwrap();
    let stride = std::mem::size_of::<PositionVertex>() as u64;
    assert_eq!(group.vertex_offset(1), 4 * stride);
}

// ============================================================================
// Depth passes
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_depth_pass_rasterizes_corner_triangle(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let device = &ctx.device;
    let mesh = ctx.upload(&corner_triangle());
    let info = DepthPassInfo::with_target(
        device,
        ctx.depth_target(4, 4),
        &DepthPassConfig::default()
            .with_layout(PositionVertex::layout())
            .with_cull_mode(CullMode::None),
    )
    .unwrap();

    let mut cmd = device.acquire_command_buffer();
    let view = mesh.view();
    render_depth_pass_into(
        &mut cmd,
        &info,
        "corner triangle",
        [(&view, DepthUniforms::from_mvp(&Mat4::identity()))],
    )
    .unwrap();
    cmd.submit_and_acquire_fence().unwrap().wait().unwrap();

    // Row 0 is the top of the target; NDC y points up. Texels (2, 0) and
    // (3, 1) sit exactly on the diagonal edge.
    let depth = read_depth_texture(device, &info.depth_texture()).unwrap();
    let at = |x: usize, y: usize| depth[y * 4 + x];
    assert!(depth.iter().all(|&d| d == 0.0 || d == 1.0));
    assert_eq!(at(2, 1), 0.0);
    for (x, y) in [(0, 0), (1, 1), (3, 0), (3, 3), (0, 3), (2, 2)] {
        assert_eq!(at(x, y), 1.0, "texel ({x}, {y})");
    }
    let covered = depth.iter().filter(|&&d| d == 0.0).count();
    match backend {
        Backend::Dummy => {
            assert_eq!(covered, 3);
            assert_eq!(at(2, 0), 0.0);
            assert_eq!(at(3, 1), 0.0);
        }
        // Hardware applies its own fill rule to texels on an edge.
        Backend::WebGpu => assert!((1..=3).contains(&covered)),
    }
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_prepass_and_main_pass_share_mvp(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let mut renderer = ctx.renderer(16, 16);
    let mut scene = RobotScene::new(
        &renderer,
        RobotSceneConfig::default()
            .with_shadows(false)
            .with_ssao(false)
            .with_prepass(true),
    )
    .unwrap();
    let model = Mat4::new_translation(&Vec3::new(0.5, -0.25, 0.0)) * Mat4::new_scaling(0.75);
    scene
        .add_geometry(GeometryKind::TriangleMesh, &[generate_cube()], model)
        .unwrap();
    let camera = Camera::perspective_looking_at(
        1.0,
        1.0,
        0.1,
        20.0,
        Vec3::new(2.0, -3.0, 2.0),
        Vec3::zeros(),
    );

    renderer.begin_frame().unwrap();
    assert!(renderer.wait_and_acquire_swapchain().unwrap());
    scene.render(&mut renderer, &camera).unwrap();

    let mut pass = None;
    let mut prepass_mvp = None;
    let mut main_mvp = None;
    for command in renderer.command_buffer().unwrap().commands() {
        match command {
            Command::BeginRenderPass(desc) => pass = desc.label.clone(),
            Command::PushUniform {
                stage: ShaderStage::Vertex,
                slot: 0,
                data,
            } => match pass.as_deref() {
                Some("depth pre-pass") if prepass_mvp.is_none() => prepass_mvp = Some(data.clone()),
                Some("robot scene") if main_mvp.is_none() => main_mvp = Some(data[..64].to_vec()),
                _ => {}
            },
            _ => {}
        }
    }
    renderer.end_frame().unwrap();

    let prepass_mvp = prepass_mvp.expect("pre-pass pushed no MVP");
    assert_eq!(prepass_mvp.len(), 64);
    assert_eq!(Some(prepass_mvp), main_mvp);
}

// ============================================================================
// Shadows and cameras
// ============================================================================

#[rstest]
#[case(Aabb::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 2.0)), Vec3::new(0.3, 0.2, -1.0))]
#[case(Aabb::new(Vec3::new(4.0, -7.0, 1.0), Vec3::new(9.0, -2.5, 1.5)), Vec3::new(0.0, 0.0, -1.0))]
#[case(
    Aabb::new(Vec3::new(-0.01, -0.01, -0.01), Vec3::new(0.01, 0.01, 0.01)),
    Vec3::new(1.0, 0.0, 0.0)
)]
fn test_shadow_fit_contains_bounds(#[case] bounds: Aabb, #[case] direction: Vec3) {
    let light = DirectionalLight {
        direction,
        ..Default::default()
    };
    let fit = fit_shadow_to_aabb(&bounds, &light).unwrap();
    assert_eq!(fit.radius * 16.0, (fit.radius * 16.0).round());
    assert!(fit.radius >= bounds.radius());

    let view_proj = fit.camera.view_proj();
    for corner in bounds.corners() {
        let clip = view_proj * Point3::from(corner).to_homogeneous();
        let ndc = clip.xyz() / clip.w;
        assert!(ndc.x.abs() <= 1.0 + 1e-5, "x {ndc:?}");
        assert!(ndc.y.abs() <= 1.0 + 1e-5, "y {ndc:?}");
        assert!((-1e-5..=1.0 + 1e-5).contains(&ndc.z), "z {ndc:?}");
    }
}

#[rstest]
#[case(Vec3::new(3.0, -4.0, 3.0), Vec3::zeros())]
#[case(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, 0.0))]
#[case(Vec3::new(-2.0, 7.5, 0.5), Vec3::new(1.0, 1.0, 1.0))]
fn test_camera_view_is_invertible(#[case] eye: Vec3, #[case] target: Vec3) {
    let camera = Camera::perspective_looking_at(0.8, 1.5, 0.1, 100.0, eye, target);
    let view = camera.view_matrix();
    let round_trip = view.try_inverse().unwrap().try_inverse().unwrap();
    assert_relative_eq!(round_trip, view, epsilon = 1e-5);
    assert_relative_eq!(
        camera.pose().to_homogeneous(),
        view.try_inverse().unwrap(),
        epsilon = 1e-5
    );
    assert_relative_eq!(camera.position(), eye, epsilon = 1e-5);
}

#[test]
fn test_shadow_projection_depth_terms() {
    let proj = shadow_orthographic_matrix(Vec2::new(10.0, 10.0), -5.0, 5.0);
    assert_relative_eq!(proj[(2, 2)], -0.1);
    assert_eq!(proj[(2, 3)], 0.0);
    assert_relative_eq!(proj[(0, 0)], 0.2);
}

// ============================================================================
// Renderer
// ============================================================================

#[test]
fn test_depth_hint_falls_back_to_supported_format() {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = Device::new(
        DeviceDescriptor::dummy()
            .with_dummy_depth_formats(vec![TextureFormat::Depth32Float]),
    )
    .unwrap();
    let renderer = Renderer::with_depth_format(
        Arc::clone(&device),
        RenderWindow::headless(8, 8),
        TextureFormat::Depth24PlusStencil8,
    )
    .unwrap();
    assert_eq!(renderer.depth_format(), TextureFormat::Depth32Float);
    assert_eq!(renderer.depth_texture().format(), TextureFormat::Depth32Float);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_scene_release_frees_gpu_memory(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let mut renderer = ctx.renderer(16, 16);
    let buffers = ctx.device.live_buffer_count();
    let textures = ctx.device.live_texture_count();

    let mut scene = RobotScene::new(
        &renderer,
        RobotSceneConfig::default().with_shadow_config(
            ShadowPassConfig::default().with_size(64, 64),
        ),
    )
    .unwrap();
    scene
        .add_geometry(GeometryKind::TriangleMesh, &[generate_cube()], Mat4::identity())
        .unwrap();
    let camera = Camera::perspective_looking_at(
        1.0,
        1.0,
        0.1,
        20.0,
        Vec3::new(2.0, -3.0, 2.0),
        Vec3::zeros(),
    );

    renderer.begin_frame().unwrap();
    assert!(renderer.wait_and_acquire_swapchain().unwrap());
    scene.render(&mut renderer, &camera).unwrap();
    renderer.end_frame().unwrap();

    scene.release();
    scene.release();
    assert_eq!(ctx.device.live_buffer_count(), buffers);
    assert_eq!(ctx.device.live_texture_count(), textures);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::webgpu(Backend::WebGpu)]
fn test_depth_pass_requires_position_attribute(#[case] backend: Backend) {
    let Some(ctx) = TestContext::new(backend) else {
        eprintln!("Skipping test: {} backend not available", backend.name());
        return;
    };
    let renderer = ctx.renderer(4, 4);
    let no_attributes = MeshLayout::new().add_binding(0, 12);
    assert!(matches!(
        DepthPassInfo::create(&renderer, &DepthPassConfig::default().with_layout(no_attributes)),
        Err(GraphicsError::InvalidParameter(_))
    ));
}
