//! # Shadow Demo
//!
//! A robot arm on a floor lit by a directional light, with shadow mapping,
//! SSAO, a depth pre-pass and debug overlays.
//!
//! Controls:
//! - left drag: orbit and dolly
//! - right drag: pan
//! - wheel: zoom
//! - `S`: toggle the arm's shadow casting
//! - `B`: toggle the scene bounds overlay
//! - `Escape`: quit

use std::sync::Arc;
use std::time::Instant;

use umbra_core::camera::{Camera, CylindricalCamera};
use umbra_core::math::{Isometry3, Mat4, Vec2, Vec3, Vec4, perspective_rh};
use umbra_demos::{DemoArm, populate_demo_scene};
use umbra_graphics::scene::{
    DebugEntryId, DebugScene, GuiSystem, RobotScene, RobotSceneConfig, Scene,
};
use umbra_graphics::{Device, DeviceDescriptor, GraphicsError, RenderWindow, Renderer};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

const ARM_LINKS: usize = 4;
const FOV_Y: f32 = 0.9;

/// Renderer plus everything drawn into it.
struct Graphics {
    renderer: Renderer,
    robot: RobotScene,
    debug: DebugScene,
    gui: GuiSystem,
    arm: DemoArm,
    bounds_overlay: Option<DebugEntryId>,
    arm_casts_shadows: bool,
}

impl Graphics {
    fn new(window: Arc<Window>) -> Result<Self, GraphicsError> {
        let device = Device::new(DeviceDescriptor::new().with_label("shadow demo"))?;
        let renderer = Renderer::new(device, RenderWindow::winit(window))?;

        let mut robot = RobotScene::new(&renderer, RobotSceneConfig::default().with_prepass(true))?;
        let arm = populate_demo_scene(&mut robot, ARM_LINKS)?;

        let mut debug = DebugScene::new(&renderer)?;
        debug.add_line_grid(8, 0.5, Some(Vec4::new(0.3, 0.3, 0.35, 1.0)), Mat4::identity())?;
        debug.add_triad(Mat4::identity(), 0.5)?;

        let mut gui = GuiSystem::new();
        gui.set_callback(|_pass, (width, height)| {
            log::trace!("overlay pass {width}x{height}");
        });

        Ok(Self {
            renderer,
            robot,
            debug,
            gui,
            arm,
            bounds_overlay: None,
            arm_casts_shadows: true,
        })
    }

    fn render(&mut self, camera: &Camera) -> Result<(), GraphicsError> {
        self.renderer.begin_frame()?;
        if self.renderer.wait_and_acquire_swapchain()? {
            let layers: [&mut dyn Scene; 3] = [&mut self.robot, &mut self.debug, &mut self.gui];
            for layer in layers {
                layer.render(&mut self.renderer, camera)?;
            }
        }
        self.renderer.end_frame()
    }

    fn toggle_arm_shadows(&mut self) {
        self.arm_casts_shadows = !self.arm_casts_shadows;
        for id in &self.arm.links {
            self.robot.set_opaque(*id, self.arm_casts_shadows);
        }
        log::info!("arm casts shadows: {}", self.arm_casts_shadows);
    }

    fn toggle_bounds(&mut self) -> Result<(), GraphicsError> {
        match self.bounds_overlay.take() {
            Some(id) => {
                self.debug.remove(id);
            }
            None => {
                let bounds = self.robot.world_space_bounds();
                if !bounds.is_empty() {
                    let id = self.debug.add_aabb(&bounds, Vec4::new(1.0, 0.9, 0.2, 1.0))?;
                    self.bounds_overlay = Some(id);
                }
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        self.robot.release();
        self.debug.release();
        self.gui.release();
    }
}

/// Which mouse drag is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drag {
    Orbit,
    Pan,
}

struct App {
    window: Option<Arc<Window>>,
    graphics: Option<Graphics>,
    camera: CylindricalCamera,
    drag: Option<Drag>,
    cursor: Option<Vec2>,
    start: Instant,
}

impl App {
    fn new() -> Self {
        let mut camera = CylindricalCamera::new(Camera::new(
            perspective_rh(FOV_Y, 16.0 / 9.0, 0.05, 100.0),
            Isometry3::identity(),
        ));
        camera.look_at(&Vec3::new(3.0, -3.5, 2.5), &Vec3::new(0.0, 0.0, 0.8));
        Self {
            window: None,
            graphics: None,
            camera,
            drag: None,
            cursor: None,
            start: Instant::now(),
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let aspect = width as f32 / height as f32;
        self.camera.camera.projection = perspective_rh(FOV_Y, aspect, 0.05, 100.0);
    }

    fn cursor_moved(&mut self, position: Vec2) {
        if let (Some(previous), Some(drag)) = (self.cursor, self.drag) {
            let step = (position - previous) * 0.01;
            match drag {
                Drag::Orbit => {
                    self.camera.viewport_drag(
                        Vec2::new(-step.x, step.y),
                        1.0,
                        1.0,
                        CylindricalCamera::DEFAULT_Y_INVERT,
                    );
                }
                Drag::Pan => {
                    self.camera.pan(step, 1.0);
                }
            }
        }
        self.cursor = Some(position);
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(graphics) = &mut self.graphics else {
            return;
        };
        graphics.arm.update(&mut graphics.robot, self.start.elapsed().as_secs_f32() * 0.5);
        if let Err(e) = graphics.render(&self.camera.camera) {
            log::error!("frame failed: {e}");
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("umbra - shadow demo")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        let size = window.inner_size();
        self.resize(size.width, size.height);
        match Graphics::new(Arc::clone(&window)) {
            Ok(graphics) => self.graphics = Some(graphics),
            Err(e) => {
                log::error!("Failed to initialize graphics: {e}");
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::MouseInput { state, button, .. } => {
                self.drag = match (state, button) {
                    (ElementState::Pressed, MouseButton::Left) => Some(Drag::Orbit),
                    (ElementState::Pressed, MouseButton::Right) => Some(Drag::Pan),
                    _ => None,
                };
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 40.0,
                };
                if lines != 0.0 {
                    self.camera.move_in_out(1.1, lines);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                let Some(graphics) = &mut self.graphics else {
                    return;
                };
                match event.logical_key.as_ref() {
                    Key::Named(NamedKey::Escape) => event_loop.exit(),
                    Key::Character("s") => graphics.toggle_arm_shadows(),
                    Key::Character("b") => {
                        if let Err(e) = graphics.toggle_bounds() {
                            log::warn!("bounds overlay: {e}");
                        }
                    }
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(graphics) = &mut self.graphics {
            graphics.release();
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting umbra shadow demo");
    log::info!("Core version: {}", umbra_core::VERSION);
    log::info!("Graphics version: {}", umbra_graphics::VERSION);
    umbra_graphics::init();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {e}");
            return;
        }
    };
    let mut app = App::new();
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {e}");
    }
}
