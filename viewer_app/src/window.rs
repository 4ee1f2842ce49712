//! GLFW window hosting the viewer's Vulkan surface
//!
//! Raw GLFW events are translated into the engine's input events here, so
//! the application never sees a GLFW type.

use ash::vk;
use glfw::{Action, Key, MouseButton, WindowEvent};
use scene_engine::gpu::{SurfaceProvider, VulkanError, VulkanResult};
use scene_engine::prelude::{MouseMotionEvent, MouseWheelEvent, ResizeEvent, WindowConfig};
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not start
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// The OS refused to create the window
    #[error("Window creation failed")]
    CreationFailed,
}

/// Input the viewer reacts to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Drawable size changed
    Resized(ResizeEvent),
    /// Cursor moved
    MouseMoved(MouseMotionEvent),
    /// Wheel scrolled
    MouseWheel(MouseWheelEvent),
}

/// Turns absolute cursor positions into per-event deltas
#[derive(Debug, Default)]
pub struct CursorTracker {
    last: Option<(f64, f64)>,
}

impl CursorTracker {
    /// Movement since the previous position; zero for the first one
    pub fn delta(&mut self, x: f64, y: f64) -> (f32, f32) {
        let delta = match self.last {
            Some((last_x, last_y)) => ((x - last_x) as f32, (y - last_y) as f32),
            None => (0.0, 0.0),
        };
        self.last = Some((x, y));
        delta
    }
}

/// GLFW window with Vulkan surface support
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, WindowEvent)>,
    cursor: CursorTracker,
}

impl Window {
    /// Open a window without a client API, sized and titled from `config`
    pub fn new(config: &WindowConfig) -> Result<Self, WindowError> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| WindowError::InitializationFailed(format!("{:?}", e)))?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(
                config.width,
                config.height,
                &config.title,
                glfw::WindowMode::Windowed,
            )
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);
        window.set_cursor_pos_polling(true);
        window.set_scroll_polling(true);

        log::info!("Window created: {}x{}", config.width, config.height);
        Ok(Self {
            glfw,
            window,
            events,
            cursor: CursorTracker::default(),
        })
    }

    /// `true` once the user asked to close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// `true` while the drawable area is empty
    pub fn is_minimized(&self) -> bool {
        let (width, height) = self.framebuffer_size();
        width == 0 || height == 0
    }

    /// Block until the next OS event (used while minimized)
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Replace the title bar text
    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// Pump the OS queue and translate everything that arrived
    pub fn poll_events(&mut self) -> Vec<InputEvent> {
        self.glfw.poll_events();

        let raw: Vec<WindowEvent> = glfw::flush_messages(&self.events)
            .map(|(_, event)| event)
            .collect();

        raw.into_iter()
            .filter_map(|event| self.translate(event))
            .collect()
    }

    fn translate(&mut self, event: WindowEvent) -> Option<InputEvent> {
        match event {
            WindowEvent::Key(Key::Escape, _, Action::Press, _) | WindowEvent::Close => {
                self.window.set_should_close(true);
                None
            }
            WindowEvent::FramebufferSize(width, height) => {
                Some(InputEvent::Resized(ResizeEvent {
                    width: width.max(0) as u32,
                    height: height.max(0) as u32,
                }))
            }
            WindowEvent::CursorPos(x, y) => {
                let (rel_x, rel_y) = self.cursor.delta(x, y);
                Some(InputEvent::MouseMoved(MouseMotionEvent {
                    rel_x,
                    rel_y,
                    left_button: self.window.get_mouse_button(MouseButton::Button1)
                        == Action::Press,
                    shift: self.key_held(Key::LeftShift) || self.key_held(Key::RightShift),
                    control: self.key_held(Key::LeftControl)
                        || self.key_held(Key::RightControl),
                }))
            }
            WindowEvent::Scroll(_, y) => Some(InputEvent::MouseWheel(MouseWheelEvent {
                delta: y as f32,
                control: self.key_held(Key::LeftControl) || self.key_held(Key::RightControl),
            })),
            _ => None,
        }
    }

    fn key_held(&self, key: Key) -> bool {
        self.window.get_key(key) == Action::Press
    }
}

impl SurfaceProvider for Window {
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        self.glfw.get_required_instance_extensions().ok_or_else(|| {
            VulkanError::InitializationFailed("GLFW reports no Vulkan support".to_string())
        })
    }

    fn create_surface(&mut self, instance: &ash::Instance) -> VulkanResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result =
            self.window
                .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(VulkanError::Api(result))
        }
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cursor_position_has_no_delta() {
        let mut tracker = CursorTracker::default();
        assert_eq!(tracker.delta(100.0, 50.0), (0.0, 0.0));
        assert_eq!(tracker.delta(103.0, 45.0), (3.0, -5.0));
        assert_eq!(tracker.delta(103.0, 45.0), (0.0, 0.0));
    }
}
