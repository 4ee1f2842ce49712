//! Sampled textures
//!
//! [`TextureData`] is the decoded RGBA8 pixel data of every mip level, packed
//! into one contiguous byte array. [`Texture`] records its upload into a
//! caller-supplied command list and keeps the staging buffer alive until the
//! caller confirms, through [`Texture::finish_upload`], that the GPU has
//! finished the copy.

use std::path::Path;

use ash::vk;
use image::imageops::FilterType;
use image::RgbaImage;

use super::buffer::GpuBuffer;
use super::command_list::CommandList;
use super::descriptor_heap::DescriptorHeap;
use super::device::GraphicsContext;
use super::error::{VulkanError, VulkanResult};
use super::memory;
use super::resource_state::{ResourceState, Transition};

/// Format every texture is created with
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// One mip level inside [`TextureData::pixels`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipLevel {
    /// Level width in pixels
    pub width: u32,
    /// Level height in pixels
    pub height: u32,
    /// Byte offset of the level
    pub offset: u64,
}

/// CPU-side pixels for a full mip chain
#[derive(Debug, Clone)]
pub struct TextureData {
    levels: Vec<MipLevel>,
    pixels: Vec<u8>,
}

/// Number of levels in a full chain down to 1x1
#[must_use]
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

impl TextureData {
    /// Decode an image file and build its mip chain
    pub fn from_file(path: impl AsRef<Path>) -> image::ImageResult<Self> {
        let decoded = image::open(path.as_ref())?.to_rgba8();
        Ok(Self::from_image(decoded))
    }

    /// Build the mip chain for an RGBA8 image
    #[must_use]
    pub fn from_image(base: RgbaImage) -> Self {
        let count = mip_level_count(base.width(), base.height());
        let mut levels = Vec::with_capacity(count as usize);
        let mut pixels = Vec::new();

        let mut current = base;
        for level in 0..count {
            levels.push(MipLevel {
                width: current.width(),
                height: current.height(),
                offset: pixels.len() as u64,
            });
            pixels.extend_from_slice(current.as_raw());

            if level + 1 < count {
                let width = (current.width() / 2).max(1);
                let height = (current.height() / 2).max(1);
                current = image::imageops::resize(&current, width, height, FilterType::Triangle);
            }
        }

        Self { levels, pixels }
    }

    /// 1x1 texture of a single color
    #[must_use]
    pub fn solid_color(rgba: [u8; 4]) -> Self {
        Self::from_image(RgbaImage::from_pixel(1, 1, image::Rgba(rgba)))
    }

    /// Width of the top level
    #[must_use]
    pub fn width(&self) -> u32 {
        self.levels[0].width
    }

    /// Height of the top level
    #[must_use]
    pub fn height(&self) -> u32 {
        self.levels[0].height
    }

    /// Every mip level, largest first
    #[must_use]
    pub fn levels(&self) -> &[MipLevel] {
        &self.levels
    }

    /// Packed pixels of all levels
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn copy_regions(&self) -> Vec<vk::BufferImageCopy> {
        self.levels
            .iter()
            .enumerate()
            .map(|(mip, level)| vk::BufferImageCopy {
                buffer_offset: level.offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: mip as u32,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width: level.width,
                    height: level.height,
                    depth: 1,
                },
            })
            .collect()
    }
}

/// GPU-resident texture with one shader-visible view in a descriptor heap
pub struct Texture {
    device: ash::Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    staging: Option<GpuBuffer>,
    slot: u32,
    descriptor_set: vk::DescriptorSet,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl Texture {
    /// Create the image and record its upload into `list`
    ///
    /// The view is written to heap slot `slot`, which must already be
    /// allocated. The texture keeps its staging buffer until
    /// [`Self::finish_upload`]; call it only after the fence value of the
    /// submission that executed `list` has completed.
    pub fn new(
        context: &GraphicsContext,
        list: &mut CommandList,
        heap: &DescriptorHeap,
        slot: u32,
        data: &TextureData,
    ) -> VulkanResult<Self> {
        let descriptor_set = heap.set(slot)?;
        let device = &context.device;
        let extent = vk::Extent2D {
            width: data.width(),
            height: data.height(),
        };
        let mip_levels = data.levels().len() as u32;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .format(TEXTURE_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        // Remaining handles are filled in as they are created; Drop cleans
        // up whatever exists if a later step fails
        let mut texture = Self {
            device: device.clone(),
            image,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            staging: None,
            slot,
            descriptor_set,
            extent,
            mip_levels,
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        texture.memory = memory::allocate(
            context,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        unsafe {
            device
                .bind_image_memory(image, texture.memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let staging = GpuBuffer::new(
            context,
            data.pixels().len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.write_bytes(data.pixels())?;

        let subresource = texture.subresource_range();
        list.transition_image(
            image,
            subresource,
            Transition::new(ResourceState::Undefined, ResourceState::CopyDest),
        );
        list.copy_buffer_to_image(staging.handle(), image, &data.copy_regions());
        list.transition_image(
            image,
            subresource,
            Transition::new(ResourceState::CopyDest, ResourceState::ShaderResource),
        );
        texture.staging = Some(staging);

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(subresource);
        texture.view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };
        heap.write_image_view(slot, texture.view)?;

        log::debug!(
            "Texture {}x{} ({} mips) recorded into heap slot {}",
            extent.width,
            extent.height,
            mip_levels,
            slot
        );
        Ok(texture)
    }

    /// Release the staging buffer once the upload has executed on the GPU
    pub fn finish_upload(&mut self) {
        self.staging = None;
    }

    /// `true` while the staging buffer is still held
    #[must_use]
    pub const fn has_pending_upload(&self) -> bool {
        self.staging.is_some()
    }

    /// Descriptor-heap slot of the view
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Descriptor set bound as a texture table
    #[must_use]
    pub const fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Top-level size
    #[must_use]
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(5, 3), 3);
        assert_eq!(mip_level_count(1, 1024), 11);
    }

    #[test]
    fn test_mip_chain_layout() {
        let data = TextureData::from_image(RgbaImage::new(4, 2));
        let levels = data.levels();

        assert_eq!(levels.len(), 3);
        assert_eq!((levels[0].width, levels[0].height, levels[0].offset), (4, 2, 0));
        assert_eq!((levels[1].width, levels[1].height, levels[1].offset), (2, 1, 32));
        assert_eq!((levels[2].width, levels[2].height, levels[2].offset), (1, 1, 40));
        assert_eq!(data.pixels().len(), 44);
    }

    #[test]
    fn test_copy_regions_follow_levels() {
        let data = TextureData::from_image(RgbaImage::new(8, 8));
        let regions = data.copy_regions();

        assert_eq!(regions.len(), 4);
        for (mip, region) in regions.iter().enumerate() {
            assert_eq!(region.image_subresource.mip_level, mip as u32);
            assert_eq!(region.buffer_offset, data.levels()[mip].offset);
            assert_eq!(region.buffer_offset % 4, 0);
        }
        assert_eq!(regions[3].image_extent.width, 1);
    }

    #[test]
    fn test_solid_color_is_single_level() {
        let white = TextureData::solid_color([255, 255, 255, 255]);

        assert_eq!(white.width(), 1);
        assert_eq!(white.height(), 1);
        assert_eq!(white.levels().len(), 1);
        assert_eq!(white.pixels(), &[255, 255, 255, 255]);
    }

    #[test]
    fn test_from_file_missing() {
        let path = std::env::temp_dir().join("scene_engine_missing_texture.png");
        assert!(TextureData::from_file(path).is_err());
    }
}
