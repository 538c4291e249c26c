//! Window and swapchain integration test.
//!
//! Opens a small winit window, renders a robot scene with debug overlays for
//! a few frames and exits.
//!
//! # CI Compatibility
//!
//! If the event loop, the window or a surface-compatible device cannot be
//! created (headless CI), the test is skipped and passes.
//!
//! ```bash
//! cargo test -p umbra-graphics --test window_test
//! ```

#![cfg(feature = "wgpu-backend")]

use std::sync::Arc;

use umbra_core::camera::Camera;
use umbra_core::math::{Mat4, Vec3, Vec4};
use umbra_core::mesh::generators::{generate_cube, generate_plane};
use umbra_graphics::passes::ShadowPassConfig;
use umbra_graphics::scene::{
    DebugScene, GeometryKind, GuiSystem, RobotScene, RobotSceneConfig, Scene,
};
use umbra_graphics::{BackendType, Device, DeviceDescriptor, RenderWindow, Renderer};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;
use winit::window::{Window, WindowId};

/// Number of frames to render before exiting.
const FRAMES_TO_RENDER: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestResult {
    Running,
    Passed,
    /// Window or device not available.
    Skipped,
    Failed,
}

struct Scenes {
    robot: RobotScene,
    debug: DebugScene,
    gui: GuiSystem,
}

struct WindowTestApp {
    result: TestResult,
    renderer: Option<Renderer>,
    scenes: Option<Scenes>,
    camera: Camera,
    frame_count: u32,
}

impl WindowTestApp {
    fn new() -> Self {
        Self {
            result: TestResult::Running,
            renderer: None,
            scenes: None,
            camera: Camera::perspective_looking_at(
                0.9,
                4.0 / 3.0,
                0.05,
                50.0,
                Vec3::new(3.0, -4.0, 2.5),
                Vec3::zeros(),
            ),
            frame_count: 0,
        }
    }

    /// Create the renderer and the scenes for `window`.
    fn init_graphics(&mut self, window: Arc<Window>) -> Result<(), String> {
        let device = Device::new(DeviceDescriptor::new().with_backend(BackendType::Wgpu))
            .map_err(|e| format!("device: {e}"))?;
        let renderer = Renderer::new(device, RenderWindow::winit(window))
            .map_err(|e| format!("renderer: {e}"))?;

        let mut robot = RobotScene::new(
            &renderer,
            RobotSceneConfig::default()
                .with_shadow_config(ShadowPassConfig::default().with_size(512, 512)),
        )
        .map_err(|e| format!("robot scene: {e}"))?;
        robot
            .add_geometry(GeometryKind::TriangleMesh, &[generate_cube()], Mat4::identity())
            .map_err(|e| format!("cube: {e}"))?;
        robot
            .add_environment_object(
                generate_plane(4.0, Vec4::new(0.6, 0.6, 0.6, 1.0)),
                Mat4::new_translation(&Vec3::new(0.0, 0.0, -0.5)),
                GeometryKind::TriangleMesh,
            )
            .map_err(|e| format!("floor: {e}"))?;

        let mut debug = DebugScene::new(&renderer).map_err(|e| format!("debug scene: {e}"))?;
        debug
            .add_triad(Mat4::identity(), 1.5)
            .map_err(|e| format!("triad: {e}"))?;
        let mut gui = GuiSystem::new();
        gui.set_callback(|_pass, size| log::trace!("gui overlay {size:?}"));

        self.renderer = Some(renderer);
        self.scenes = Some(Scenes { robot, debug, gui });
        Ok(())
    }

    /// Render one frame. Returns whether anything was presented.
    fn render_frame(&mut self) -> Result<bool, String> {
        let (Some(renderer), Some(scenes)) = (&mut self.renderer, &mut self.scenes) else {
            return Ok(false);
        };
        renderer.begin_frame().map_err(|e| e.to_string())?;
        let acquired = renderer.wait_and_acquire_swapchain().map_err(|e| e.to_string())?;
        if acquired {
            let layers: [&mut dyn Scene; 3] =
                [&mut scenes.robot, &mut scenes.debug, &mut scenes.gui];
            for scene in layers {
                scene
                    .render(renderer, &self.camera)
                    .map_err(|e| e.to_string())?;
            }
        }
        renderer.end_frame().map_err(|e| e.to_string())?;
        Ok(acquired)
    }

    fn is_complete(&self) -> bool {
        self.result != TestResult::Running
    }

    fn shutdown(&mut self) {
        if let Some(scenes) = &mut self.scenes {
            scenes.robot.release();
            scenes.debug.release();
            scenes.gui.release();
        }
        self.scenes = None;
        self.renderer = None;
    }
}

impl ApplicationHandler for WindowTestApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("umbra window test")
            .with_inner_size(winit::dpi::LogicalSize::new(320, 240))
            .with_visible(true);
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::info!("Window creation failed (expected on CI): {e}");
                self.result = TestResult::Skipped;
                event_loop.exit();
                return;
            }
        };
        if let Err(e) = self.init_graphics(window) {
            log::info!("Graphics initialization failed, skipping test: {e}");
            self.result = TestResult::Skipped;
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.result = TestResult::Failed;
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => {
                    self.frame_count += 1;
                    if self.frame_count >= FRAMES_TO_RENDER {
                        log::info!("Rendered {FRAMES_TO_RENDER} frames");
                        self.result = TestResult::Passed;
                        event_loop.exit();
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    log::error!("Frame rendering failed: {e}");
                    self.result = TestResult::Failed;
                    event_loop.exit();
                }
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer
            && let RenderWindow::Winit(window) = renderer.window()
        {
            window.request_redraw();
        }
    }
}

/// Pump the event loop until the app finishes. Returns true on pass or skip.
fn run_window_test() -> bool {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    // Tests run off the main thread.
    #[cfg(target_os = "windows")]
    let event_loop = EventLoop::builder().with_any_thread(true).build();
    #[cfg(target_os = "macos")]
    let event_loop = match std::panic::catch_unwind(EventLoop::new) {
        Ok(result) => result,
        Err(_) => {
            log::info!("Event loop needs the main thread on macOS, skipping");
            return true;
        }
    };
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let event_loop = EventLoop::new();

    let mut event_loop = match event_loop {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::info!("Event loop creation failed (expected on CI): {e}");
            return true;
        }
    };

    let mut app = WindowTestApp::new();
    let max_iterations = 1000;
    let mut iterations = 0;
    loop {
        match event_loop.pump_app_events(None, &mut app) {
            PumpStatus::Exit(_) => break,
            PumpStatus::Continue => {
                if app.is_complete() {
                    break;
                }
                iterations += 1;
                if iterations >= max_iterations {
                    log::warn!("Test timed out after {max_iterations} iterations");
                    app.result = TestResult::Failed;
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }
    }
    app.shutdown();

    match app.result {
        TestResult::Passed | TestResult::Skipped => true,
        TestResult::Failed | TestResult::Running => false,
    }
}

#[test]
fn test_window_renders_scene_frames() {
    assert!(run_window_test(), "window test failed, see log for details");
}
