//! Vulkan backend
//!
//! RAII wrappers around the explicit GPU objects the renderer needs. Every
//! wrapper keeps a clone of the logical device and destroys its handles on
//! drop; none of them wait for the GPU while dropping, so owners must call
//! [`CommandQueue::flush`] first.

pub mod buffer;
pub mod command_list;
pub mod descriptor_heap;
pub mod device;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod resource_state;
pub mod shader;
pub mod swapchain;
pub mod texture;

pub use buffer::{ConstantBuffer, FrameBuffered, GpuBuffer, IndexBuffer, VertexBuffer};
pub use command_list::{CommandList, RenderTargets};
pub use descriptor_heap::{DescriptorHeap, SlotAllocator};
pub use device::{Device, GraphicsContext, PhysicalDeviceInfo};
pub use error::{VulkanError, VulkanResult};
pub use instance::{SurfaceProvider, VulkanInstance};
pub use pipeline::{
    BindingKind, BindingLayout, CullMode, Pipeline, PipelineDesc, ResolvedBinding, SamplerDesc,
    ShaderStage, VertexLayout, SAMPLER_BASE,
};
pub use queue::{AllocatorPool, CommandQueue};
pub use resource_state::{ResourceState, Transition};
pub use shader::ShaderModule;
pub use swapchain::{PresentOutcome, Swapchain, SwapchainDesc};
pub use texture::{MipLevel, Texture, TextureData, TEXTURE_FORMAT};

/// Color format every pipeline renders into when the surface offers it
pub const PREFERRED_COLOR_FORMAT: ash::vk::Format = ash::vk::Format::B8G8R8A8_SRGB;

/// Depth buffer format
pub const DEPTH_FORMAT: ash::vk::Format = ash::vk::Format::D32_SFLOAT;
