//! Scene rendering on top of the [`crate::gpu`] layer
//!
//! Everything here records into a [`crate::gpu::CommandList`] handed in by
//! the caller; nothing submits work except [`Model::load`], which uploads
//! its textures in one batch.

pub mod camera;
pub mod constants;
pub mod frame;
pub mod grid;
pub mod lighting;
pub mod material;
pub mod mesh;
pub mod model;
pub mod vertex;

pub use camera::Camera;
pub use constants::{MaterialData, MvpConstants};
pub use frame::{AcquireState, FrameViewport, ResizeDecision};
pub use grid::{Grid, GridParams};
pub use lighting::{Light, LightBufferData, LightDesc, LightType, Lighting, MAX_LIGHTS};
pub use material::{Material, MaterialBinding};
pub use mesh::Mesh;
pub use model::{BoundingSphere, MeshRecord, Model, ModelError, ModelLayout, TextureSource};
pub use vertex::Vertex;

/// Binding names shared by pipeline layouts and draw code
pub mod bindings {
    /// Model and view-projection matrices
    pub const MVP: &str = "MVP";
    /// Per-draw surface constants
    pub const MATERIAL: &str = "Material";
    /// Light array and scene lighting scalars
    pub const LIGHTS: &str = "Lights";
    /// Base-color texture table
    pub const BASE_COLOR_TEXTURE: &str = "BaseColorTexture";
    /// Grid fade parameters
    pub const GRID_PARAMS: &str = "GridParams";
}
