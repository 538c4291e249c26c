//! Overlay hook for immediate-mode GUIs.

use umbra_core::camera::Camera;

use crate::command::{ColorAttachment, RenderPass, RenderPassDescriptor};
use crate::error::GraphicsError;
use crate::renderer::Renderer;

use super::{Scene, frame_target};

/// Draws into the swapchain image. The second argument is the target size
/// in pixels.
pub type GuiCallback = Box<dyn FnMut(&mut RenderPass<'_>, (u32, u32))>;

/// Runs one registered callback in a color-only pass that loads the frame.
///
/// Render it last: the pass has no depth attachment and draws over
/// everything before it.
#[derive(Default)]
pub struct GuiSystem {
    callback: Option<GuiCallback>,
}

impl std::fmt::Debug for GuiSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuiSystem")
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl GuiSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the callback.
    pub fn set_callback(
        &mut self,
        callback: impl FnMut(&mut RenderPass<'_>, (u32, u32)) + 'static,
    ) {
        self.callback = Some(Box::new(callback));
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}

impl Scene for GuiSystem {
    fn render(&mut self, renderer: &mut Renderer, _camera: &Camera) -> Result<(), GraphicsError> {
        let Some(callback) = &mut self.callback else {
            return Ok(());
        };
        let target = frame_target(renderer)?;
        let size = renderer.size();
        let cmd = renderer.command_buffer()?;
        let mut pass = cmd.begin_render_pass(
            RenderPassDescriptor::new()
                .with_label("gui")
                .with_color_attachment(ColorAttachment::load(target)),
        )?;
        callback(&mut pass, size);
        Ok(())
    }

    fn release(&mut self) {
        self.callback = None;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::command::Command;
    use crate::device::{Device, DeviceDescriptor};
    use crate::types::LoadOp;
    use crate::window::RenderWindow;

    #[test]
    fn test_callback_runs_in_color_load_pass() {
        let device = Device::new(DeviceDescriptor::dummy()).unwrap();
        let mut renderer = Renderer::new(device, RenderWindow::headless(6, 3)).unwrap();
        let mut gui = GuiSystem::new();
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&sizes);
        gui.set_callback(move |pass, size| {
            assert_eq!(pass.depth_format(), None);
            seen.borrow_mut().push(size);
        });

        renderer.begin_frame().unwrap();
        assert!(renderer.wait_and_acquire_swapchain().unwrap());
        gui.render(&mut renderer, &Camera::default()).unwrap();
        match &renderer.command_buffer().unwrap().commands()[0] {
            Command::BeginRenderPass(desc) => {
                assert_eq!(desc.color_attachments[0].load, LoadOp::Load);
                assert!(desc.depth_attachment.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
        renderer.end_frame().unwrap();
        assert_eq!(*sizes.borrow(), vec![(6, 3)]);
    }

    #[test]
    fn test_without_callback_records_nothing() {
        let device = Device::new(DeviceDescriptor::dummy()).unwrap();
        let mut renderer = Renderer::new(device, RenderWindow::headless(4, 4)).unwrap();
        let mut gui = GuiSystem::new();
        renderer.begin_frame().unwrap();
        gui.render(&mut renderer, &Camera::default()).unwrap();
        assert!(renderer.command_buffer().unwrap().commands().is_empty());
        renderer.end_frame().unwrap();
        assert!(!gui.has_callback());
    }
}
