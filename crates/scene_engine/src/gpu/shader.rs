//! SPIR-V shader modules

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use ash::vk;

use super::error::{VulkanError, VulkanResult};

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: ash::Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: &ash::Device, bytes: &[u8]) -> VulkanResult<Self> {
        // read_spv copes with unaligned input and checks the magic number
        let code = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| VulkanError::Shader(format!("Invalid SPIR-V: {e}")))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    /// Load shader from SPIR-V file
    pub fn from_file(device: &ash::Device, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            VulkanError::Shader(format!("Failed to read {}: {e}", path.display()))
        })?;
        log::debug!("Loaded shader {}", path.display());
        Self::from_bytes(device, &bytes)
    }

    /// Get shader module handle
    #[must_use]
    pub const fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage create info using `main` as the entry point
    #[must_use]
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        const ENTRY_POINT: &CStr = c"main";
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}
