//! Graphics pipelines with named resource bindings
//!
//! A pipeline declares its shader-visible resources as a [`BindingLayout`]:
//! symbolic names mapped to a kind, a shader register and a stage. The layout
//! is validated once when the pipeline is built and resolved into concrete
//! Vulkan locations, so draw code binds resources by name:
//!
//! - constant buffers live in set 0, a push-descriptor set, at
//!   `binding = register`
//! - immutable samplers live in set 0 at `binding = SAMPLER_BASE + register`
//! - each texture table is its own set, numbered from 1 in declaration order,
//!   using the descriptor heap's single-image layout

use std::collections::{HashMap, HashSet};

use ash::vk;

use super::device::GraphicsContext;
use super::error::{VulkanError, VulkanResult};
use super::shader::ShaderModule;

/// First set-0 binding used for samplers; constant-buffer registers must stay below it
pub const SAMPLER_BASE: u32 = 8;

/// Shader stages that can see a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex shader only
    Vertex,
    /// Fragment shader only
    Fragment,
    /// Vertex and fragment shaders
    All,
}

impl ShaderStage {
    /// Vulkan stage flags
    #[must_use]
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::All => vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// What a named binding refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// One uniform buffer
    ConstantBuffer,
    /// One descriptor-heap slot holding a sampled image
    TextureTable,
}

/// Concrete location of a named binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBinding {
    /// Push-descriptor binding in set 0
    ConstantBuffer {
        /// Binding number within set 0
        binding: u32,
    },
    /// Descriptor set index for a heap slot
    TextureTable {
        /// Set number
        set: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NamedBinding {
    name: String,
    kind: BindingKind,
    register: u32,
    stage: ShaderStage,
}

/// Static sampler baked into the pipeline layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Sampler register (`binding = SAMPLER_BASE + register`)
    pub register: u32,
    /// Min/mag filter
    pub filter: vk::Filter,
    /// Addressing on every axis
    pub address_mode: vk::SamplerAddressMode,
    /// Stages that sample with it
    pub stage: ShaderStage,
}

impl SamplerDesc {
    /// Trilinear wrapping sampler visible to fragment shaders
    #[must_use]
    pub const fn linear_wrap(register: u32) -> Self {
        Self {
            register,
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            stage: ShaderStage::Fragment,
        }
    }
}

/// Ordered declaration of a pipeline's resources
#[derive(Debug, Clone, Default)]
pub struct BindingLayout {
    bindings: Vec<NamedBinding>,
    samplers: Vec<SamplerDesc>,
}

impl BindingLayout {
    /// Empty layout
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a constant buffer at shader register `register`
    #[must_use]
    pub fn constant_buffer(mut self, name: &str, register: u32, stage: ShaderStage) -> Self {
        self.bindings.push(NamedBinding {
            name: name.to_string(),
            kind: BindingKind::ConstantBuffer,
            register,
            stage,
        });
        self
    }

    /// Declare a one-texture table at shader register `register`
    #[must_use]
    pub fn texture_table(mut self, name: &str, register: u32, stage: ShaderStage) -> Self {
        self.bindings.push(NamedBinding {
            name: name.to_string(),
            kind: BindingKind::TextureTable,
            register,
            stage,
        });
        self
    }

    /// Declare a static sampler
    #[must_use]
    pub fn sampler(mut self, desc: SamplerDesc) -> Self {
        self.samplers.push(desc);
        self
    }

    /// Kind of the binding called `name`
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<BindingKind> {
        self.bindings.iter().find(|b| b.name == name).map(|b| b.kind)
    }

    /// `true` if any texture table is declared
    #[must_use]
    pub fn has_texture_tables(&self) -> bool {
        self.bindings
            .iter()
            .any(|b| b.kind == BindingKind::TextureTable)
    }

    /// Reject names or registers that would collide once resolved
    pub fn validate(&self) -> VulkanResult<()> {
        let mut names = HashSet::new();
        let mut cb_registers = HashSet::new();
        let mut table_registers = HashSet::new();

        for binding in &self.bindings {
            if binding.name.is_empty() {
                return Err(VulkanError::InvalidLayout(
                    "binding names must not be empty".to_string(),
                ));
            }
            if !names.insert(binding.name.as_str()) {
                return Err(VulkanError::InvalidLayout(format!(
                    "binding '{}' declared twice",
                    binding.name
                )));
            }

            let unique_register = match binding.kind {
                BindingKind::ConstantBuffer => {
                    if binding.register >= SAMPLER_BASE {
                        return Err(VulkanError::InvalidLayout(format!(
                            "constant buffer '{}' uses register b{}, limit is b{}",
                            binding.name,
                            binding.register,
                            SAMPLER_BASE - 1
                        )));
                    }
                    cb_registers.insert(binding.register)
                }
                BindingKind::TextureTable => table_registers.insert(binding.register),
            };
            if !unique_register {
                return Err(VulkanError::InvalidLayout(format!(
                    "binding '{}' reuses register {}",
                    binding.name, binding.register
                )));
            }
        }

        let mut sampler_registers = HashSet::new();
        for sampler in &self.samplers {
            if !sampler_registers.insert(sampler.register) {
                return Err(VulkanError::InvalidLayout(format!(
                    "sampler register s{} declared twice",
                    sampler.register
                )));
            }
        }
        Ok(())
    }

    /// Validate and map every name to its concrete location
    pub fn resolve(&self) -> VulkanResult<HashMap<String, ResolvedBinding>> {
        self.validate()?;

        let mut next_set = 1;
        let resolved = self
            .bindings
            .iter()
            .map(|binding| {
                let location = match binding.kind {
                    BindingKind::ConstantBuffer => ResolvedBinding::ConstantBuffer {
                        binding: binding.register,
                    },
                    BindingKind::TextureTable => {
                        let set = next_set;
                        next_set += 1;
                        ResolvedBinding::TextureTable { set }
                    }
                };
                (binding.name.clone(), location)
            })
            .collect();
        Ok(resolved)
    }
}

/// Face culling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull back faces
    Back,
}

/// Interleaved vertex input description for binding 0
#[derive(Debug, Clone, Default)]
pub struct VertexLayout {
    /// Bytes between consecutive vertices
    pub stride: u32,
    /// Per-location attributes
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// Everything needed to build a [`Pipeline`]
pub struct PipelineDesc<'a> {
    /// Compiled vertex shader
    pub vertex_shader: &'a ShaderModule,
    /// Compiled fragment shader
    pub fragment_shader: &'a ShaderModule,
    /// Vertex input layout
    pub vertex_layout: VertexLayout,
    /// Named resource bindings
    pub bindings: BindingLayout,
    /// Set layout used for every texture table (the descriptor heap's layout)
    pub texture_table_layout: vk::DescriptorSetLayout,
    /// Color attachment format
    pub color_format: vk::Format,
    /// Depth attachment format
    pub depth_format: vk::Format,
    /// Rasterizer culling
    pub cull_mode: CullMode,
}

/// Immutable pipeline state plus its resolved binding table
pub struct Pipeline {
    device: ash::Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    push_set_layout: vk::DescriptorSetLayout,
    samplers: Vec<vk::Sampler>,
    bindings: HashMap<String, ResolvedBinding>,
}

impl Pipeline {
    /// Build the pipeline layout and graphics pipeline described by `desc`
    pub fn new(context: &GraphicsContext, desc: &PipelineDesc<'_>) -> VulkanResult<Self> {
        let bindings = desc.bindings.resolve()?;
        if desc.bindings.has_texture_tables()
            && desc.texture_table_layout == vk::DescriptorSetLayout::null()
        {
            return Err(VulkanError::InvalidLayout(
                "texture tables declared without a descriptor heap layout".to_string(),
            ));
        }

        // Partially built objects are released by Drop if a later step fails
        let mut pipeline = Self {
            device: context.device.clone(),
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            push_set_layout: vk::DescriptorSetLayout::null(),
            samplers: Vec::new(),
            bindings,
        };

        for sampler in &desc.bindings.samplers {
            let handle = create_sampler(&context.device, sampler)?;
            pipeline.samplers.push(handle);
        }
        pipeline.push_set_layout = pipeline.create_push_set_layout(&desc.bindings)?;

        let table_count = desc
            .bindings
            .bindings
            .iter()
            .filter(|b| b.kind == BindingKind::TextureTable)
            .count();
        let mut set_layouts = vec![pipeline.push_set_layout];
        set_layouts.extend(std::iter::repeat(desc.texture_table_layout).take(table_count));

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        pipeline.layout = unsafe {
            context
                .device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        pipeline.pipeline = pipeline.create_graphics_pipeline(desc)?;

        log::debug!(
            "Pipeline created with {} bindings, {} samplers",
            pipeline.bindings.len(),
            pipeline.samplers.len()
        );
        Ok(pipeline)
    }

    fn create_push_set_layout(
        &self,
        layout: &BindingLayout,
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let mut set_bindings: Vec<vk::DescriptorSetLayoutBinding> = layout
            .bindings
            .iter()
            .filter(|b| b.kind == BindingKind::ConstantBuffer)
            .map(|b| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(b.register)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(b.stage.flags())
                    .build()
            })
            .collect();

        for (desc, sampler) in layout.samplers.iter().zip(&self.samplers) {
            set_bindings.push(
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(SAMPLER_BASE + desc.register)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .stage_flags(desc.stage.flags())
                    .immutable_samplers(std::slice::from_ref(sampler))
                    .build(),
            );
        }

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .flags(vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR)
            .bindings(&set_bindings);

        unsafe {
            self.device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn create_graphics_pipeline(&self, desc: &PipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
        let shader_stages = [
            desc.vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            desc.fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let vertex_bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: desc.vertex_layout.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_layout.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor (set dynamically)
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let cull_mode = match desc.cull_mode {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Back => vk::CullModeFlags::BACK,
        };
        // Right-handed, counter-clockwise meshes stay counter-clockwise
        // through the Y-flipping projection
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .attachments(&color_blend_attachments);

        let color_formats = [desc.color_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(desc.depth_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .push_next(&mut rendering_info)
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .build();

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| VulkanError::Api(e))?
        };
        pipelines.into_iter().next().ok_or_else(|| {
            VulkanError::InitializationFailed("Driver returned no pipeline".to_string())
        })
    }

    /// Get pipeline handle
    #[must_use]
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get pipeline layout handle
    #[must_use]
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Concrete location of the binding called `name`
    pub fn binding(&self, name: &str) -> VulkanResult<ResolvedBinding> {
        self.bindings
            .get(name)
            .copied()
            .ok_or_else(|| VulkanError::UnknownBinding {
                name: name.to_string(),
            })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
            self.device
                .destroy_descriptor_set_layout(self.push_set_layout, None);
            for &sampler in &self.samplers {
                self.device.destroy_sampler(sampler, None);
            }
        }
    }
}

fn create_sampler(device: &ash::Device, desc: &SamplerDesc) -> VulkanResult<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::builder()
        .mag_filter(desc.filter)
        .min_filter(desc.filter)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(desc.address_mode)
        .address_mode_v(desc.address_mode)
        .address_mode_w(desc.address_mode)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK);

    unsafe {
        device
            .create_sampler(&sampler_info, None)
            .map_err(VulkanError::Api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_layout() -> BindingLayout {
        BindingLayout::new()
            .constant_buffer("MVP", 0, ShaderStage::Vertex)
            .constant_buffer("Material", 1, ShaderStage::Fragment)
            .constant_buffer("Lights", 2, ShaderStage::Fragment)
            .texture_table("BaseColorTexture", 0, ShaderStage::Fragment)
            .sampler(SamplerDesc::linear_wrap(0))
    }

    #[test]
    fn test_resolve_scene_layout() {
        let resolved = scene_layout().resolve().unwrap();

        assert_eq!(resolved.len(), 4);
        assert_eq!(
            resolved["MVP"],
            ResolvedBinding::ConstantBuffer { binding: 0 }
        );
        assert_eq!(
            resolved["Lights"],
            ResolvedBinding::ConstantBuffer { binding: 2 }
        );
        assert_eq!(
            resolved["BaseColorTexture"],
            ResolvedBinding::TextureTable { set: 1 }
        );
    }

    #[test]
    fn test_texture_tables_take_sets_in_declaration_order() {
        let resolved = BindingLayout::new()
            .texture_table("Normal", 1, ShaderStage::Fragment)
            .constant_buffer("MVP", 0, ShaderStage::Vertex)
            .texture_table("Albedo", 0, ShaderStage::Fragment)
            .resolve()
            .unwrap();

        assert_eq!(resolved["Normal"], ResolvedBinding::TextureTable { set: 1 });
        assert_eq!(resolved["Albedo"], ResolvedBinding::TextureTable { set: 2 });
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let layout = BindingLayout::new()
            .constant_buffer("MVP", 0, ShaderStage::Vertex)
            .texture_table("MVP", 0, ShaderStage::Fragment);

        assert!(matches!(layout.validate(), Err(VulkanError::InvalidLayout(_))));
    }

    #[test]
    fn test_register_collisions_rejected() {
        let cb = BindingLayout::new()
            .constant_buffer("A", 1, ShaderStage::Vertex)
            .constant_buffer("B", 1, ShaderStage::Fragment);
        assert!(cb.validate().is_err());

        // Constant buffers and texture tables have separate register spaces
        let mixed = BindingLayout::new()
            .constant_buffer("A", 0, ShaderStage::Vertex)
            .texture_table("T", 0, ShaderStage::Fragment);
        assert!(mixed.validate().is_ok());

        let samplers = BindingLayout::new()
            .sampler(SamplerDesc::linear_wrap(0))
            .sampler(SamplerDesc::linear_wrap(0));
        assert!(samplers.validate().is_err());
    }

    #[test]
    fn test_constant_buffer_register_limit() {
        let layout = BindingLayout::new().constant_buffer("Big", SAMPLER_BASE, ShaderStage::All);
        assert!(layout.validate().is_err());

        let layout =
            BindingLayout::new().constant_buffer("Last", SAMPLER_BASE - 1, ShaderStage::All);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let layout = BindingLayout::new().constant_buffer("", 0, ShaderStage::Vertex);
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_kind_lookup() {
        let layout = scene_layout();
        assert_eq!(layout.kind_of("MVP"), Some(BindingKind::ConstantBuffer));
        assert_eq!(
            layout.kind_of("BaseColorTexture"),
            Some(BindingKind::TextureTable)
        );
        assert_eq!(layout.kind_of("Missing"), None);
        assert!(layout.has_texture_tables());
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert!(ShaderStage::All
            .flags()
            .contains(vk::ShaderStageFlags::FRAGMENT));
    }
}
