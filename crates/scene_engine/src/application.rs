//! Application lifecycle
//!
//! [`SceneApplication`] builds every GPU component in dependency order,
//! drives one update and one render per loop iteration, follows window
//! resizes and tears everything down in reverse order.
//!
//! ```text
//! Uninitialized --initialize--> Initialized --update/render--> Running
//!       \______________________________________________________/
//!                               cleanup --> CleanedUp
//! ```
//!
//! Per-frame constant buffers exist once per frame slot. A slot is reused
//! only after the fence value of its previous submission has completed,
//! which is waited for at the end of [`SceneApplication::render`].

use thiserror::Error;

use crate::config::{ConfigError, ViewerConfig};
use crate::foundation::math::{utils, Mat4, Vec3};
use crate::gpu::{
    BindingLayout, CommandQueue, ConstantBuffer, CullMode, Device, FrameBuffered, Pipeline,
    PipelineDesc, PresentOutcome, ResourceState, SamplerDesc, ShaderModule, ShaderStage,
    SurfaceProvider, Swapchain, SwapchainDesc, VulkanError, DEPTH_FORMAT,
};
use crate::render::{
    bindings, AcquireState, Camera, FrameViewport, Grid, LightBufferData, LightDesc, Lighting, MaterialData,
    Model, ModelError, MvpConstants, ResizeDecision, Vertex,
};

/// Radians of orbit per pixel of mouse motion
const ORBIT_SENSITIVITY: f32 = 0.01;

/// Radians of field of view per wheel notch
const FOV_WHEEL_STEP: f32 = 0.05;

/// Application errors
#[derive(Error, Debug)]
pub enum AppError {
    /// GPU call failed
    #[error("GPU error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Model could not be loaded
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Operation not valid in the current lifecycle state
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        /// What was attempted
        operation: &'static str,
        /// State at the time
        state: AppState,
    },
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Constructed, no GPU objects yet
    Uninitialized,
    /// GPU objects built, no frame yet
    Initialized,
    /// At least one frame updated
    Running,
    /// Everything released
    CleanedUp,
}

/// Window size change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEvent {
    /// New drawable width in pixels
    pub width: u32,
    /// New drawable height in pixels
    pub height: u32,
}

/// Mouse movement with the modifier state at the time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseMotionEvent {
    /// Horizontal movement since the previous event, in pixels
    pub rel_x: f32,
    /// Vertical movement since the previous event, in pixels (down is positive)
    pub rel_y: f32,
    /// Left button held
    pub left_button: bool,
    /// Shift held
    pub shift: bool,
    /// Control held
    pub control: bool,
}

/// Mouse wheel movement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseWheelEvent {
    /// Notches scrolled; positive away from the user
    pub delta: f32,
    /// Control held: dolly instead of changing the field of view
    pub control: bool,
}

/// Resources the scene pipeline's shaders see
#[must_use]
pub fn scene_binding_layout() -> BindingLayout {
    BindingLayout::new()
        .constant_buffer(bindings::MVP, 0, ShaderStage::Vertex)
        .constant_buffer(bindings::MATERIAL, 1, ShaderStage::Fragment)
        .constant_buffer(bindings::LIGHTS, 2, ShaderStage::Fragment)
        .texture_table(bindings::BASE_COLOR_TEXTURE, 0, ShaderStage::Fragment)
        .sampler(SamplerDesc::linear_wrap(0))
}

/// The lights every scene starts with: a white sun and a warm point light
#[must_use]
pub fn default_lights() -> [LightDesc; 2] {
    [
        LightDesc::directional(Vec3::new(0.5, 1.0, -0.5), Vec3::new(1.0, 1.0, 1.0), 1.0),
        LightDesc::point(Vec3::new(-1.0, 5.0, 0.0), 20.0, Vec3::new(1.0, 0.9, 0.8), 1.0),
    ]
}

// Field order is teardown order
struct Renderer {
    grid: Grid,
    model: Model,
    mvp: FrameBuffered<ConstantBuffer<MvpConstants>>,
    material: ConstantBuffer<MaterialData>,
    lights: FrameBuffered<ConstantBuffer<LightBufferData>>,
    pipeline: Pipeline,
    camera: Camera,
    lighting: Lighting,
    swapchain: Swapchain,
    queue: CommandQueue,
    device: Device,

    viewport: FrameViewport,
    // Last size asked for; the extent may be clamped below it
    requested_size: FrameViewport,
    frame_slot: usize,
    slot_fences: Vec<u64>,
}

/// The model viewer
pub struct SceneApplication {
    config: ViewerConfig,
    state: AppState,
    renderer: Option<Renderer>,
}

impl SceneApplication {
    /// Create an application; no GPU work happens until [`Self::initialize`]
    #[must_use]
    pub const fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            state: AppState::Uninitialized,
            renderer: None,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> AppState {
        self.state
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Build every GPU component for `window` and load the model
    pub fn initialize(&mut self, window: &mut impl SurfaceProvider) -> Result<(), AppError> {
        if self.state != AppState::Uninitialized {
            return Err(AppError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }
        self.config.validate()?;
        log::info!("Initializing {}", self.config.window.title);

        let renderer_config = &self.config.renderer;
        let scene_config = &self.config.scene;

        let device = Device::new(
            window,
            &self.config.window.title,
            renderer_config.enable_validation,
        )?;
        let mut queue = CommandQueue::new(device.context())?;

        let (width, height) = window.framebuffer_size();
        let mut swapchain = Swapchain::new(
            &device,
            &mut queue,
            &SwapchainDesc {
                width,
                height,
                buffer_count: renderer_config.frame_buffer_count,
                allow_tearing: !renderer_config.vsync && device.supports_tearing(),
                heap_capacity: renderer_config.descriptor_heap_capacity,
            },
        )?;
        let context = device.context().clone();

        let model = Model::load(
            &context,
            &mut queue,
            swapchain.srv_heap_mut(),
            &scene_config.model_path,
        )?;

        let frame_count = swapchain.buffer_count() as usize;
        let mvp = FrameBuffered::try_new(frame_count, |_| {
            ConstantBuffer::new(&context, &MvpConstants::default())
        })?;
        let material = ConstantBuffer::new(&context, &MaterialData::default())?;
        let lights = FrameBuffered::try_new(frame_count, |_| {
            ConstantBuffer::new(&context, Lighting::new().data())
        })?;

        let viewport = FrameViewport::from_extent(swapchain.extent());
        let bounds = model.bounds();
        let far = (bounds.radius * scene_config.far_radius_multiplier)
            .max(scene_config.near_plane + 1.0);
        let mut camera = Camera::new(
            utils::deg_to_rad(scene_config.fov_degrees),
            viewport.aspect(),
            scene_config.near_plane,
            far,
        );
        camera.frame_model(bounds.center, bounds.radius);

        let mut lighting = Lighting::new();
        lighting.set_global_ambient(Vec3::repeat(scene_config.ambient));
        lighting.set_blinn_phong(scene_config.blinn_phong);
        for (index, light) in default_lights().iter().enumerate() {
            lighting.set_light(index, light);
        }

        let vertex_shader =
            ShaderModule::from_file(&context.device, renderer_config.shader_path("scene.vert.spv"))?;
        let fragment_shader =
            ShaderModule::from_file(&context.device, renderer_config.shader_path("scene.frag.spv"))?;
        let pipeline = Pipeline::new(
            &context,
            &PipelineDesc {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                vertex_layout: Vertex::layout(),
                bindings: scene_binding_layout(),
                texture_table_layout: swapchain.srv_heap().layout(),
                color_format: swapchain.format(),
                depth_format: DEPTH_FORMAT,
                cull_mode: CullMode::Back,
            },
        )?;

        let grid = Grid::new(&context, renderer_config, swapchain.format(), frame_count)?;

        self.renderer = Some(Renderer {
            grid,
            model,
            mvp,
            material,
            lights,
            pipeline,
            camera,
            lighting,
            swapchain,
            queue,
            device,
            viewport,
            requested_size: FrameViewport::new(width, height),
            frame_slot: 0,
            slot_fences: vec![0; frame_count],
        });
        self.state = AppState::Initialized;
        log::info!(
            "Initialized: {}x{}, {} frame slots",
            viewport.width(),
            viewport.height(),
            frame_count
        );
        Ok(())
    }

    /// Advance the camera by `delta_time` seconds and refresh this frame's constants
    pub fn update(&mut self, delta_time: f32) -> Result<(), AppError> {
        let fade_distance = self.config.renderer.grid_fade_distance;
        let renderer = self.renderer_mut("update")?;
        let slot = renderer.frame_slot;

        renderer.camera.update(delta_time);
        let view_proj = renderer.camera.view_projection();
        let eye = renderer.camera.position();

        renderer
            .mvp
            .get(slot)
            .update(&MvpConstants::new(&Mat4::identity(), &view_proj));

        renderer.lighting.set_eye_position(eye);
        renderer.lighting.update_gpu(renderer.lights.get(slot));

        renderer.grid.update_mvp(slot, &view_proj);
        renderer.grid.update_grid_params(slot, eye, fade_distance);

        self.state = AppState::Running;
        Ok(())
    }

    /// Record, submit and present one frame, then wait for the next slot
    pub fn render(&mut self) -> Result<(), AppError> {
        let clear_color = self.config.renderer.clear_color;
        let renderer = self.renderer_mut("render")?;
        let slot = renderer.frame_slot;

        let mut recreated = false;
        loop {
            match AcquireState::decide(renderer.swapchain.is_acquired(), recreated) {
                AcquireState::Ready => break,
                AcquireState::Recreate => {
                    renderer.recreate_at_requested_size()?;
                    recreated = true;
                }
                AcquireState::Skip => {
                    log::debug!("No back buffer acquired, frame skipped");
                    return Ok(());
                }
            }
        }

        let mut list = renderer.queue.get_command_list()?;
        list.set_viewport(renderer.viewport.viewport());
        list.set_scissor(renderer.viewport.scissor());

        renderer
            .swapchain
            .transition_back_buffer(&mut list, ResourceState::RenderTarget);
        renderer.swapchain.prepare_depth(&mut list);
        list.begin_rendering(&renderer.swapchain.render_targets(clear_color))?;

        renderer.grid.draw(&mut list, slot)?;

        let pipeline = &renderer.pipeline;
        list.bind_pipeline(pipeline);
        list.bind_constant_buffer(pipeline, bindings::MVP, renderer.mvp.get(slot))?;
        list.bind_constant_buffer(pipeline, bindings::MATERIAL, &renderer.material)?;
        list.bind_constant_buffer(pipeline, bindings::LIGHTS, renderer.lights.get(slot))?;
        renderer.model.draw(&mut list, pipeline)?;

        list.end_rendering()?;
        renderer
            .swapchain
            .transition_back_buffer(&mut list, ResourceState::Present);

        let fence_value = renderer.queue.execute_for_present(
            list,
            renderer.swapchain.image_available(),
            renderer.swapchain.render_finished(),
        )?;
        renderer.slot_fences[slot] = fence_value;

        if renderer.swapchain.present(&mut renderer.queue)? == PresentOutcome::OutOfDate {
            renderer.recreate_at_requested_size()?;
        }

        renderer.frame_slot = (slot + 1) % renderer.slot_fences.len();
        renderer
            .queue
            .fence_wait(renderer.slot_fences[renderer.frame_slot])?;
        log::trace!("Frame submitted (fence {})", fence_value);
        Ok(())
    }

    /// Follow a window size change
    ///
    /// Zero-area (minimized) and same-size events are ignored.
    pub fn on_resize(&mut self, event: &ResizeEvent) -> Result<(), AppError> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        match renderer.requested_size.decide_resize(event.width, event.height) {
            ResizeDecision::Minimized => {
                log::debug!("Resize skipped (minimized: {}x{})", event.width, event.height);
                Ok(())
            }
            ResizeDecision::Unchanged => Ok(()),
            ResizeDecision::Resize { width, height } => {
                renderer.requested_size = FrameViewport::new(width, height);
                renderer.recreate_swapchain(width, height)?;
                self.config.window.width = width;
                self.config.window.height = height;
                log::info!("Resized to {}x{}", width, height);
                Ok(())
            }
        }
    }

    /// Left drag orbits; left drag with shift pans
    pub fn on_mouse_moved(&mut self, event: &MouseMotionEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if !event.left_button {
            return;
        }

        if event.shift {
            renderer.camera.pan(event.rel_x, event.rel_y);
        } else {
            renderer
                .camera
                .orbit(event.rel_x * ORBIT_SENSITIVITY, event.rel_y * ORBIT_SENSITIVITY);
        }
    }

    /// Wheel narrows or widens the field of view; with control it dollies
    pub fn on_mouse_wheel(&mut self, event: &MouseWheelEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        if event.control {
            renderer.camera.zoom(event.delta);
        } else {
            let fov = renderer.camera.fov() - event.delta * FOV_WHEEL_STEP;
            renderer.camera.set_fov(fov);
        }
    }

    /// Flush the GPU and release everything in reverse construction order
    pub fn cleanup(&mut self) {
        let Some(mut renderer) = self.renderer.take() else {
            self.state = AppState::CleanedUp;
            return;
        };
        log::info!("Cleanup started");

        if let Err(e) = renderer.swapchain.release(&mut renderer.queue) {
            log::error!("Queue flush before teardown failed: {}", e);
        }

        let Renderer {
            grid,
            model,
            mvp,
            material,
            lights,
            pipeline,
            swapchain,
            queue,
            device,
            ..
        } = renderer;

        drop(grid);
        log::debug!("Grid released");
        drop(model);
        log::debug!("Model released");
        drop(mvp);
        drop(material);
        drop(lights);
        log::debug!("Constant buffers released");
        drop(pipeline);
        log::debug!("Pipeline released");
        drop(swapchain);
        log::debug!("Swapchain released");
        drop(queue);
        log::debug!("Command queue released");
        drop(device);

        self.state = AppState::CleanedUp;
        log::info!("Cleanup finished");
    }

    fn renderer_mut(&mut self, operation: &'static str) -> Result<&mut Renderer, AppError> {
        let state = self.state;
        self.renderer
            .as_mut()
            .ok_or(AppError::InvalidState { operation, state })
    }
}

impl Renderer {
    fn recreate_at_requested_size(&mut self) -> Result<(), AppError> {
        let (width, height) = (self.requested_size.width(), self.requested_size.height());
        log::debug!("Recreating out-of-date swapchain at {}x{}", width, height);
        self.recreate_swapchain(width, height)
    }

    fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<(), AppError> {
        self.queue.flush()?;
        self.swapchain.resize(&mut self.queue, width, height)?;

        self.viewport = FrameViewport::from_extent(self.swapchain.extent());
        self.camera.set_aspect(self.viewport.aspect());
        // Everything in flight has retired
        self.slot_fences.fill(0);
        Ok(())
    }
}

impl Drop for SceneApplication {
    fn drop(&mut self) {
        if self.renderer.is_some() {
            self.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::ResolvedBinding;
    use crate::render::MAX_LIGHTS;

    #[test]
    fn test_scene_layout_named_bindings() {
        let layout = scene_binding_layout();
        assert!(layout.validate().is_ok());

        let resolved = layout.resolve().unwrap();
        assert_eq!(
            resolved[bindings::MVP],
            ResolvedBinding::ConstantBuffer { binding: 0 }
        );
        assert_eq!(
            resolved[bindings::MATERIAL],
            ResolvedBinding::ConstantBuffer { binding: 1 }
        );
        assert_eq!(
            resolved[bindings::LIGHTS],
            ResolvedBinding::ConstantBuffer { binding: 2 }
        );
        assert_eq!(
            resolved[bindings::BASE_COLOR_TEXTURE],
            ResolvedBinding::TextureTable { set: 1 }
        );
    }

    #[test]
    fn test_default_lights_fit() {
        let mut lighting = Lighting::new();
        for (index, light) in default_lights().iter().enumerate() {
            lighting.set_light(index, light);
        }
        assert_eq!(lighting.num_lights() as usize, default_lights().len());
        assert!(default_lights().len() <= MAX_LIGHTS);
    }

    #[test]
    fn test_lifecycle_before_initialize() {
        let mut app = SceneApplication::new(ViewerConfig::default());
        assert_eq!(app.state(), AppState::Uninitialized);

        assert!(matches!(
            app.update(0.016),
            Err(AppError::InvalidState { operation: "update", .. })
        ));
        assert!(matches!(
            app.render(),
            Err(AppError::InvalidState { operation: "render", .. })
        ));

        // Input before the scene exists is dropped
        assert!(app.on_resize(&ResizeEvent { width: 10, height: 10 }).is_ok());
        app.on_mouse_moved(&MouseMotionEvent {
            rel_x: 5.0,
            rel_y: 5.0,
            left_button: true,
            shift: false,
            control: false,
        });
        app.on_mouse_wheel(&MouseWheelEvent {
            delta: 1.0,
            control: false,
        });

        app.cleanup();
        assert_eq!(app.state(), AppState::CleanedUp);
    }
}
