//! # Scene Engine
//!
//! Frame-render and GPU-resource lifecycle engine for a single-window Vulkan
//! model viewer.
//!
//! ## Layout
//!
//! - [`gpu`]: device, command queue with timeline fence, descriptor heap,
//!   swapchain, buffers, textures, pipelines with named bindings
//! - [`assets`]: scene import (OBJ, glTF) and geometry post-processing
//! - [`render`]: meshes, materials, models, camera, lighting, ground grid
//! - [`application`]: the init → update/render → resize → teardown lifecycle
//!
//! The crate never creates a window itself. Callers hand it a
//! [`gpu::SurfaceProvider`] and forward input through the
//! [`application::SceneApplication`] event handlers.
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn run(window: &mut impl SurfaceProvider) -> Result<(), AppError> {
//!     let config = ViewerConfig::default();
//!     let mut app = SceneApplication::new(config);
//!     app.initialize(window)?;
//!     app.update(1.0 / 60.0)?;
//!     app.render()?;
//!     app.cleanup();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod application;
pub mod assets;
pub mod config;
pub mod foundation;
pub mod gpu;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        application::{
            AppError, AppState, MouseMotionEvent, MouseWheelEvent, ResizeEvent, SceneApplication,
        },
        config::{Config, RendererConfig, SceneConfig, ViewerConfig, WindowConfig},
        foundation::time::Timer,
        gpu::SurfaceProvider,
    };
}
