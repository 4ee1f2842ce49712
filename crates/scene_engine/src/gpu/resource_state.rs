//! Resource states and the barriers between them
//!
//! GPU images are always in exactly one [`ResourceState`]. Moving between
//! states is a [`Transition`], which resolves to the image layouts, access
//! masks and pipeline stages of one image memory barrier.

use ash::vk;

/// How an image will next be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Contents undefined; valid only as a source state
    Undefined,
    /// Owned by the presentation engine
    Present,
    /// Color attachment being written
    RenderTarget,
    /// Depth attachment being tested and written
    DepthWrite,
    /// Destination of a transfer copy
    CopyDest,
    /// Sampled from fragment shaders
    ShaderResource,
}

impl ResourceState {
    /// Image layout for this state
    #[must_use]
    pub const fn layout(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::Present => vk::ImageLayout::PRESENT_SRC_KHR,
            Self::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthWrite => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            Self::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Memory accesses performed while in this state
    #[must_use]
    pub fn access(self) -> vk::AccessFlags {
        match self {
            Self::Undefined | Self::Present => vk::AccessFlags::empty(),
            Self::RenderTarget => {
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            }
            Self::DepthWrite => {
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
            }
            Self::CopyDest => vk::AccessFlags::TRANSFER_WRITE,
            Self::ShaderResource => vk::AccessFlags::SHADER_READ,
        }
    }

    /// Pipeline stages that perform those accesses
    #[must_use]
    pub fn stage(self) -> vk::PipelineStageFlags {
        match self {
            Self::Undefined => vk::PipelineStageFlags::TOP_OF_PIPE,
            // Acquire semaphores are waited at color output, so present
            // transitions are ordered against that stage
            Self::Present | Self::RenderTarget => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthWrite => {
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
            }
            Self::CopyDest => vk::PipelineStageFlags::TRANSFER,
            Self::ShaderResource => vk::PipelineStageFlags::FRAGMENT_SHADER,
        }
    }
}

/// One state change of one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the barrier
    pub from: ResourceState,
    /// State after the barrier
    pub to: ResourceState,
    /// Source stage mask
    pub src_stage: vk::PipelineStageFlags,
    /// Destination stage mask
    pub dst_stage: vk::PipelineStageFlags,
    /// Drop the previous contents instead of preserving them
    pub discard: bool,
}

impl Transition {
    /// Transition with the default stage masks of both states
    #[must_use]
    pub fn new(from: ResourceState, to: ResourceState) -> Self {
        Self {
            from,
            to,
            src_stage: from.stage(),
            dst_stage: to.stage(),
            discard: false,
        }
    }

    /// Re-enter `state` with undefined contents, ordered after earlier
    /// accesses in that same state (e.g. a depth buffer cleared every frame)
    #[must_use]
    pub fn discard(state: ResourceState) -> Self {
        Self {
            discard: true,
            ..Self::new(state, state)
        }
    }

    /// Replace the source stage mask
    #[must_use]
    pub fn with_src_stage(mut self, stage: vk::PipelineStageFlags) -> Self {
        self.src_stage = stage;
        self
    }

    /// `true` when the barrier would change nothing
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from == self.to && !self.discard
    }

    /// Image memory barrier covering `subresource` of `image`
    #[must_use]
    pub fn barrier(
        &self,
        image: vk::Image,
        subresource: vk::ImageSubresourceRange,
    ) -> vk::ImageMemoryBarrier {
        vk::ImageMemoryBarrier::builder()
            .old_layout(if self.discard {
                vk::ImageLayout::UNDEFINED
            } else {
                self.from.layout()
            })
            .new_layout(self.to.layout())
            .src_access_mask(self.from.access())
            .dst_access_mask(self.to.access())
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_range() -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    #[test]
    fn test_present_to_render_target() {
        let transition = Transition::new(ResourceState::Present, ResourceState::RenderTarget);
        let barrier = transition.barrier(vk::Image::null(), color_range());

        assert_eq!(barrier.old_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(barrier.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::empty());
        assert!(barrier
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        assert_eq!(
            transition.src_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }

    #[test]
    fn test_texture_upload_sequence() {
        let upload = Transition::new(ResourceState::Undefined, ResourceState::CopyDest);
        assert_eq!(upload.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(upload.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let ready = Transition::new(ResourceState::CopyDest, ResourceState::ShaderResource);
        let barrier = ready.barrier(vk::Image::null(), color_range());
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::SHADER_READ);
        assert_eq!(ready.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_noop_and_stage_override() {
        assert!(Transition::new(ResourceState::Present, ResourceState::Present).is_noop());

        let first_use = Transition::new(ResourceState::Undefined, ResourceState::RenderTarget)
            .with_src_stage(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(
            first_use.src_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(first_use.from.layout(), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_discard_orders_against_previous_writes() {
        let depth_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::DEPTH,
            ..color_range()
        };
        let transition = Transition::discard(ResourceState::DepthWrite);
        let barrier = transition.barrier(vk::Image::null(), depth_range);

        assert!(!transition.is_noop());
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert!(barrier
            .src_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(transition
            .src_stage
            .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
    }
}
