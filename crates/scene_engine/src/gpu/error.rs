//! Vulkan error types

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Every slot of a descriptor heap is in use
    #[error("Descriptor heap exhausted ({capacity} slots)")]
    DescriptorHeapExhausted {
        /// Fixed capacity of the heap
        capacity: u32,
    },

    /// A draw call referenced a binding the pipeline does not declare
    #[error("Pipeline has no binding named '{name}'")]
    UnknownBinding {
        /// Symbolic binding name
        name: String,
    },

    /// Binding layout rejected at pipeline build time
    #[error("Invalid binding layout: {0}")]
    InvalidLayout(String),

    /// Shader bytecode could not be loaded
    #[error("Shader error: {0}")]
    Shader(String),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
