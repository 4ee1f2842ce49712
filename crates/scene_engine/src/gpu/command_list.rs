//! Command list recording
//!
//! A [`CommandList`] is handed out by [`super::CommandQueue::get_command_list`]
//! already open for recording and is closed by the queue on submission.
//! Resources are bound through a [`Pipeline`]'s named bindings rather than
//! raw set/binding numbers.

use ash::extensions::khr::PushDescriptor;
use ash::vk;

use super::buffer::{ConstantBuffer, IndexBuffer, VertexBuffer};
use super::error::{VulkanError, VulkanResult};
use super::pipeline::{Pipeline, ResolvedBinding};
use super::queue::CommandAllocator;
use super::resource_state::Transition;

/// Attachments and clear values for one rendering pass
#[derive(Debug, Clone, Copy)]
pub struct RenderTargets {
    /// Color attachment view (in `RenderTarget` state)
    pub color_view: vk::ImageView,
    /// Depth attachment view (in `DepthWrite` state)
    pub depth_view: vk::ImageView,
    /// Render area
    pub extent: vk::Extent2D,
    /// Color clear value
    pub clear_color: [f32; 4],
    /// Depth clear value
    pub clear_depth: f32,
}

/// An open command buffer
pub struct CommandList {
    device: ash::Device,
    push_descriptor: PushDescriptor,
    allocator: Option<CommandAllocator>,
    command_buffer: vk::CommandBuffer,
    rendering: bool,
}

impl CommandList {
    pub(crate) fn begin(
        device: ash::Device,
        push_descriptor: PushDescriptor,
        allocator: CommandAllocator,
    ) -> VulkanResult<Self> {
        let command_buffer = allocator.command_buffer;
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = unsafe { device.begin_command_buffer(command_buffer, &begin_info) } {
            allocator.destroy(&device);
            return Err(VulkanError::Api(e));
        }

        Ok(Self {
            device,
            push_descriptor,
            allocator: Some(allocator),
            command_buffer,
            rendering: false,
        })
    }

    /// End recording and hand the allocator back to the queue
    pub(crate) fn close(&mut self) -> VulkanResult<CommandAllocator> {
        if self.rendering {
            return Err(VulkanError::InvalidOperation {
                reason: "Command list closed inside a rendering pass".to_string(),
            });
        }
        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }
        self.allocator.take().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "Command list already closed".to_string(),
        })
    }

    /// Raw command buffer
    #[must_use]
    pub const fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Record an image state transition
    pub fn transition_image(
        &mut self,
        image: vk::Image,
        subresource: vk::ImageSubresourceRange,
        transition: Transition,
    ) {
        if transition.is_noop() {
            return;
        }
        let barrier = transition.barrier(image, subresource);
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Set the dynamic viewport
    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(self.command_buffer, 0, &[viewport]);
        }
    }

    /// Set the dynamic scissor rectangle
    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe {
            self.device
                .cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
    }

    /// Begin rendering into `targets`, clearing color and depth
    pub fn begin_rendering(&mut self, targets: &RenderTargets) -> VulkanResult<()> {
        if self.rendering {
            return Err(VulkanError::InvalidOperation {
                reason: "Rendering pass already active".to_string(),
            });
        }

        let color_attachments = [vk::RenderingAttachmentInfo::builder()
            .image_view(targets.color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: targets.clear_color,
                },
            })
            .build()];

        let depth_attachment = vk::RenderingAttachmentInfo::builder()
            .image_view(targets.depth_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: targets.clear_depth,
                    stencil: 0,
                },
            });

        let rendering_info = vk::RenderingInfo::builder()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: targets.extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        unsafe {
            self.device
                .cmd_begin_rendering(self.command_buffer, &rendering_info);
        }
        self.rendering = true;
        Ok(())
    }

    /// End the active rendering pass
    pub fn end_rendering(&mut self) -> VulkanResult<()> {
        if !self.rendering {
            return Err(VulkanError::InvalidOperation {
                reason: "No rendering pass to end".to_string(),
            });
        }
        unsafe { self.device.cmd_end_rendering(self.command_buffer) };
        self.rendering = false;
        Ok(())
    }

    /// Bind a graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );
        }
    }

    /// Bind a constant buffer to the pipeline binding called `name`
    pub fn bind_constant_buffer<T>(
        &mut self,
        pipeline: &Pipeline,
        name: &str,
        buffer: &ConstantBuffer<T>,
    ) -> VulkanResult<()> {
        let ResolvedBinding::ConstantBuffer { binding } = pipeline.binding(name)? else {
            return Err(VulkanError::InvalidOperation {
                reason: format!("'{name}' is not a constant buffer binding"),
            });
        };

        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: buffer.handle(),
            offset: 0,
            range: buffer.size(),
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info)
            .build();

        unsafe {
            self.push_descriptor.cmd_push_descriptor_set(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout(),
                0,
                &[write],
            );
        }
        Ok(())
    }

    /// Bind a descriptor-heap slot to the texture table called `name`
    pub fn bind_texture_table(
        &mut self,
        pipeline: &Pipeline,
        name: &str,
        descriptor_set: vk::DescriptorSet,
    ) -> VulkanResult<()> {
        let ResolvedBinding::TextureTable { set } = pipeline.binding(name)? else {
            return Err(VulkanError::InvalidOperation {
                reason: format!("'{name}' is not a texture table binding"),
            });
        };

        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout(),
                set,
                &[descriptor_set],
                &[],
            );
        }
        Ok(())
    }

    /// Bind a vertex buffer to input binding 0
    pub fn bind_vertex_buffer(&mut self, buffer: &VertexBuffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer.handle()], &[0]);
        }
    }

    /// Bind a 32-bit index buffer
    pub fn bind_index_buffer(&mut self, buffer: &IndexBuffer) {
        unsafe {
            self.device.cmd_bind_index_buffer(
                self.command_buffer,
                buffer.handle(),
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    /// Draw `index_count` indices as one instance
    pub fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.command_buffer, index_count, 1, 0, 0, 0);
        }
    }

    /// Copy buffer regions into an image in `CopyDest` state
    pub fn copy_buffer_to_image(
        &mut self,
        buffer: vk::Buffer,
        image: vk::Image,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            );
        }
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        // Never submitted, so the GPU cannot be using it
        if let Some(allocator) = self.allocator.take() {
            log::warn!("Command list dropped without being executed");
            allocator.destroy(&self.device);
        }
    }
}
