//! Presentable back buffers, depth buffer and the shared SRV heap
//!
//! The swapchain always holds one acquired image between frames: `new` and
//! `present` both finish by acquiring the next image, so
//! [`Swapchain::current_back_buffer_index`] is the index the presentation
//! engine handed out most recently. Acquire semaphores rotate through a ring
//! and are only reused once the submission that waited on them has retired.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;

use super::command_list::{CommandList, RenderTargets};
use super::descriptor_heap::DescriptorHeap;
use super::device::{Device, GraphicsContext};
use super::error::{VulkanError, VulkanResult};
use super::memory;
use super::queue::CommandQueue;
use super::resource_state::{ResourceState, Transition};
use super::{DEPTH_FORMAT, PREFERRED_COLOR_FORMAT};

/// Swapchain construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    /// Initial width in pixels
    pub width: u32,
    /// Initial height in pixels
    pub height: u32,
    /// Requested number of back buffers
    pub buffer_count: u32,
    /// Present without waiting for vertical blank when the surface allows it
    pub allow_tearing: bool,
    /// Slots in the shared shader-resource heap
    pub heap_capacity: u32,
}

/// Result of [`Swapchain::present`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Frame queued and next image acquired
    Presented,
    /// Surface no longer matches the swapchain; call [`Swapchain::resize`]
    OutOfDate,
}

/// Acquire semaphore that still has a signal outstanding, if any
///
/// Only an acquired image leaves one behind; a failed acquire signals nothing.
#[must_use]
pub fn pending_acquire_signal(
    acquired: bool,
    acquire_slot: usize,
    semaphores: &[vk::Semaphore],
) -> Option<vk::Semaphore> {
    if acquired {
        semaphores.get(acquire_slot).copied()
    } else {
        None
    }
}

/// Pick the preferred sRGB format, falling back to the first offered
#[must_use]
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == PREFERRED_COLOR_FORMAT && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// `IMMEDIATE` when tearing is allowed and offered, otherwise `FIFO`
#[must_use]
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    allow_tearing: bool,
) -> vk::PresentModeKHR {
    if allow_tearing && available.contains(&vk::PresentModeKHR::IMMEDIATE) {
        vk::PresentModeKHR::IMMEDIATE
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the requested size clamped to the surface limits
#[must_use]
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    } else {
        caps.current_extent
    }
}

/// Requested image count clamped to the surface limits (`max == 0` is unbounded)
#[must_use]
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

struct DepthBuffer {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

impl DepthBuffer {
    const fn empty() -> Self {
        Self {
            image: vk::Image::null(),
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
        }
    }

    fn new(context: &GraphicsContext, extent: vk::Extent2D) -> VulkanResult<Self> {
        let device = &context.device;
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(DEPTH_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };
        let mut depth = Self {
            image,
            ..Self::empty()
        };

        match depth.bind_and_view(context) {
            Ok(()) => Ok(depth),
            Err(e) => {
                depth.destroy(device);
                Err(e)
            }
        }
    }

    fn bind_and_view(&mut self, context: &GraphicsContext) -> VulkanResult<()> {
        let device = &context.device;
        let requirements = unsafe { device.get_image_memory_requirements(self.image) };
        self.memory = memory::allocate(
            context,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        unsafe {
            device
                .bind_image_memory(self.image, self.memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(depth_range());
        self.view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(())
    }

    fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

const fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

const fn depth_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::DEPTH,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    context: GraphicsContext,
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    requested_count: u32,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    states: Vec<ResourceState>,
    depth: DepthBuffer,
    srv_heap: DescriptorHeap,
    // Ring of acquire semaphores and the fence value after which each is free
    image_available: Vec<vk::Semaphore>,
    released_at: Vec<u64>,
    acquire_slot: usize,
    // One per back buffer, signaled by the frame submission, waited by present
    render_finished: Vec<vk::Semaphore>,
    current_index: u32,
    acquired: bool,
}

impl Swapchain {
    /// Create the swapchain, its depth buffer and SRV heap, and acquire the first image
    pub fn new(
        device: &Device,
        queue: &mut CommandQueue,
        desc: &SwapchainDesc,
    ) -> VulkanResult<Self> {
        let context = device.context().clone();
        let surface_loader = device.surface_loader().clone();
        let surface = device.surface();

        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(context.physical_device, surface)
                .map_err(VulkanError::Api)?
        };
        let format = choose_surface_format(&formats).ok_or_else(|| {
            VulkanError::InitializationFailed("Surface offers no formats".to_string())
        })?;
        let present_mode =
            choose_present_mode(&device.physical().present_modes, desc.allow_tearing);

        let srv_heap = DescriptorHeap::new(&context, desc.heap_capacity)?;
        let loader = SwapchainLoader::new(&context.instance, &context.device);

        let mut swapchain = Self {
            depth: DepthBuffer::empty(),
            context,
            surface,
            surface_loader,
            loader,
            swapchain: vk::SwapchainKHR::null(),
            format,
            present_mode,
            extent: vk::Extent2D::default(),
            requested_count: desc.buffer_count,
            images: Vec::new(),
            views: Vec::new(),
            states: Vec::new(),
            srv_heap,
            image_available: Vec::new(),
            released_at: Vec::new(),
            acquire_slot: 0,
            render_finished: Vec::new(),
            current_index: 0,
            acquired: false,
        };

        swapchain.build(desc.width, desc.height)?;
        if swapchain.acquire_next(queue)? == PresentOutcome::OutOfDate {
            return Err(VulkanError::InitializationFailed(
                "Surface out of date at creation".to_string(),
            ));
        }

        log::info!(
            "Swapchain created: {}x{}, {} buffers, {:?}, {:?}",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len(),
            swapchain.format.format,
            swapchain.present_mode
        );
        Ok(swapchain)
    }

    fn build(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        let physical_device = self.context.physical_device;
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(VulkanError::Api)?
        };

        let extent = choose_extent(&caps, width, height);
        let min_image_count = choose_image_count(&caps, self.requested_count);
        let old_swapchain = self.swapchain;

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(min_image_count)
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        self.swapchain = unsafe {
            self.loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old_swapchain, None) };
        }
        self.extent = extent;

        self.images = unsafe {
            self.loader
                .get_swapchain_images(self.swapchain)
                .map_err(VulkanError::Api)?
        };
        if self.images.len() as u32 != self.requested_count {
            log::warn!(
                "Requested {} back buffers, presentation engine provided {}",
                self.requested_count,
                self.images.len()
            );
        }
        self.states = vec![ResourceState::Undefined; self.images.len()];

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format.format)
                .subresource_range(color_range());
            let view = unsafe {
                self.context
                    .device
                    .create_image_view(&view_info, None)
                    .map_err(VulkanError::Api)?
            };
            self.views.push(view);
        }

        self.depth = DepthBuffer::new(&self.context, extent)?;

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        for _ in 0..=self.images.len() {
            let semaphore = unsafe {
                self.context
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(VulkanError::Api)?
            };
            self.image_available.push(semaphore);
            self.released_at.push(0);
        }
        for _ in 0..self.images.len() {
            let semaphore = unsafe {
                self.context
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(VulkanError::Api)?
            };
            self.render_finished.push(semaphore);
        }
        self.acquire_slot = 0;
        Ok(())
    }

    fn release_images(&mut self) {
        let device = &self.context.device;
        unsafe {
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
            for semaphore in self.image_available.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
            for semaphore in self.render_finished.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
        }
        self.depth.destroy(device);
        self.depth = DepthBuffer::empty();
        self.released_at.clear();
        self.images.clear();
        self.states.clear();
    }

    fn acquire_next(&mut self, queue: &CommandQueue) -> VulkanResult<PresentOutcome> {
        self.acquire_slot = (self.acquire_slot + 1) % self.image_available.len();
        queue.fence_wait(self.released_at[self.acquire_slot])?;

        let semaphore = self.image_available[self.acquire_slot];
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => {
                self.current_index = index;
                self.acquired = true;
                if suboptimal {
                    log::debug!("Acquired image {} from a suboptimal swapchain", index);
                    Ok(PresentOutcome::OutOfDate)
                } else {
                    Ok(PresentOutcome::Presented)
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.acquired = false;
                Ok(PresentOutcome::OutOfDate)
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Queue the current back buffer for presentation and acquire the next one
    ///
    /// The frame's submission must already have been executed with
    /// [`Self::image_available`] and [`Self::render_finished`].
    pub fn present(&mut self, queue: &mut CommandQueue) -> VulkanResult<PresentOutcome> {
        if !self.acquired {
            return Err(VulkanError::InvalidOperation {
                reason: "No acquired back buffer to present".to_string(),
            });
        }
        // The frame that waited on this acquire is the latest submission
        self.released_at[self.acquire_slot] = queue.fence_value();
        self.acquired = false;

        let wait = [self.render_finished[self.current_index as usize]];
        let swapchains = [self.swapchain];
        let indices = [self.current_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let presented = unsafe { self.loader.queue_present(queue.handle(), &present_info) };
        match presented {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date after present");
                return Ok(PresentOutcome::OutOfDate);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        }

        self.acquire_next(queue)
    }

    /// Recreate the back buffers and depth buffer at a new size
    ///
    /// The caller must have flushed `queue`; nothing in flight may still
    /// reference the old buffers.
    pub fn resize(
        &mut self,
        queue: &mut CommandQueue,
        width: u32,
        height: u32,
    ) -> VulkanResult<()> {
        self.drain_pending_acquire(queue)?;
        queue.flush()?;

        self.release_images();
        self.build(width, height)?;

        if self.acquire_next(queue)? == PresentOutcome::OutOfDate && !self.acquired {
            log::debug!(
                "Swapchain still out of date after resize to {}x{}, no image acquired",
                width,
                height
            );
        }
        log::info!(
            "Swapchain resized to {}x{}",
            self.extent.width,
            self.extent.height
        );
        Ok(())
    }

    /// Consume the pending acquire signal and wait for the queue to drain
    ///
    /// Call before dropping the swapchain so no semaphore is destroyed with
    /// a signal still outstanding.
    pub fn release(&mut self, queue: &mut CommandQueue) -> VulkanResult<()> {
        self.drain_pending_acquire(queue)?;
        queue.flush()
    }

    fn drain_pending_acquire(&mut self, queue: &mut CommandQueue) -> VulkanResult<()> {
        if let Some(semaphore) =
            pending_acquire_signal(self.acquired, self.acquire_slot, &self.image_available)
        {
            queue.drain_semaphore(semaphore)?;
            self.acquired = false;
        }
        Ok(())
    }

    /// `true` while a back buffer is acquired and ready to be rendered
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Record a transition of the current back buffer to `to`
    pub fn transition_back_buffer(&mut self, list: &mut CommandList, to: ResourceState) {
        let index = self.current_index as usize;
        let from = self.states[index];
        let mut transition = Transition::new(from, to);
        if from == ResourceState::Undefined {
            // Ordered after the acquire semaphore wait
            transition = transition.with_src_stage(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        }
        list.transition_image(self.images[index], color_range(), transition);
        self.states[index] = to;
    }

    /// Record the per-frame discard of the shared depth buffer
    pub fn prepare_depth(&self, list: &mut CommandList) {
        list.transition_image(
            self.depth.image,
            depth_range(),
            Transition::discard(ResourceState::DepthWrite),
        );
    }

    /// Attachments of the current back buffer
    #[must_use]
    pub fn render_targets(&self, clear_color: [f32; 4]) -> RenderTargets {
        RenderTargets {
            color_view: self.views[self.current_index as usize],
            depth_view: self.depth.view,
            extent: self.extent,
            clear_color,
            clear_depth: 1.0,
        }
    }

    /// Index of the acquired back buffer
    #[must_use]
    pub const fn current_back_buffer_index(&self) -> u32 {
        self.current_index
    }

    /// Non-owning handle of back buffer `index`
    #[must_use]
    pub fn back_buffer(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    /// Tracked state of back buffer `index`
    #[must_use]
    pub fn back_buffer_state(&self, index: u32) -> Option<ResourceState> {
        self.states.get(index as usize).copied()
    }

    /// Number of back buffers
    #[must_use]
    pub fn buffer_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Semaphore the frame submission must wait on
    #[must_use]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available[self.acquire_slot]
    }

    /// Semaphore the frame submission must signal for the current back buffer
    #[must_use]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished[self.current_index as usize]
    }

    /// Current size
    #[must_use]
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Color format of the back buffers
    #[must_use]
    pub const fn format(&self) -> vk::Format {
        self.format.format
    }

    /// Shared shader-resource heap
    #[must_use]
    pub const fn srv_heap(&self) -> &DescriptorHeap {
        &self.srv_heap
    }

    /// Shared shader-resource heap, for slot allocation
    pub fn srv_heap_mut(&mut self) -> &mut DescriptorHeap {
        &mut self.srv_heap
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.release_images();
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        log::debug!("Swapchain destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32, current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: current,
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_only_acquired_image_leaves_signal() {
        use ash::vk::Handle;
        let semaphores = [
            vk::Semaphore::from_raw(1),
            vk::Semaphore::from_raw(2),
            vk::Semaphore::from_raw(3),
        ];

        assert_eq!(pending_acquire_signal(true, 1, &semaphores), Some(semaphores[1]));
        assert_eq!(pending_acquire_signal(false, 1, &semaphores), None);
        // Released images have no semaphores left
        assert_eq!(pending_acquire_signal(true, 0, &[]), None);
    }

    #[test]
    fn test_surface_format_preference() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: PREFERRED_COLOR_FORMAT,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        assert_eq!(choose_surface_format(&[unorm, srgb]), Some(srgb));
        assert_eq!(choose_surface_format(&[unorm]), Some(unorm));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_present_mode_follows_tearing_flag() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

        assert_eq!(
            choose_present_mode(&modes, true),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], true),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_uses_surface_size_when_fixed() {
        let fixed = caps(2, 8, vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(
            choose_extent(&fixed, 1280, 720),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );

        let free = caps(2, 8, vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        });
        assert_eq!(
            choose_extent(&free, 10_000, 720),
            vk::Extent2D {
                width: 4096,
                height: 720
            }
        );
    }

    #[test]
    fn test_image_count_clamped() {
        let extent = vk::Extent2D {
            width: 1,
            height: 1,
        };
        assert_eq!(choose_image_count(&caps(2, 8, extent), 3), 3);
        assert_eq!(choose_image_count(&caps(4, 8, extent), 3), 4);
        assert_eq!(choose_image_count(&caps(2, 2, extent), 3), 2);
        // No upper bound
        assert_eq!(choose_image_count(&caps(2, 0, extent), 6), 6);
    }
}
