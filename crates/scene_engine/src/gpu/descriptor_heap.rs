//! Shader-visible descriptor heap
//!
//! A fixed number of single-image descriptor sets allocated up front from one
//! pool. Slots are handed out by monotonically increasing index and never
//! freed individually; the whole heap is released at once.

use ash::vk;

use super::device::GraphicsContext;
use super::error::{VulkanError, VulkanResult};

/// Monotonic slot index allocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAllocator {
    capacity: u32,
    next: u32,
}

impl SlotAllocator {
    /// Allocator over `capacity` slots
    #[must_use]
    pub const fn new(capacity: u32) -> Self {
        Self { capacity, next: 0 }
    }

    /// Take the next free slot
    pub fn allocate(&mut self) -> VulkanResult<u32> {
        if self.next >= self.capacity {
            return Err(VulkanError::DescriptorHeapExhausted {
                capacity: self.capacity,
            });
        }
        let slot = self.next;
        self.next += 1;
        Ok(slot)
    }

    /// Slots handed out so far
    #[must_use]
    pub const fn allocated(&self) -> u32 {
        self.next
    }

    /// Total number of slots
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Table of sampled-image descriptors addressed by slot index
pub struct DescriptorHeap {
    device: ash::Device,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    slots: SlotAllocator,
}

impl DescriptorHeap {
    /// Create a heap with `capacity` slots
    pub fn new(context: &GraphicsContext, capacity: u32) -> VulkanResult<Self> {
        let device = &context.device;

        let bindings = [vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build()];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::Api)?;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLED_IMAGE,
            descriptor_count: capacity,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(capacity)
            .pool_sizes(&pool_sizes);
        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let layouts = vec![layout; capacity as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets,
            Err(e) => {
                unsafe {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(layout, None);
                }
                return Err(VulkanError::Api(e));
            }
        };

        log::debug!("Descriptor heap created with {} slots", capacity);

        Ok(Self {
            device: device.clone(),
            layout,
            pool,
            sets,
            slots: SlotAllocator::new(capacity),
        })
    }

    /// Reserve the next slot
    pub fn allocate(&mut self) -> VulkanResult<u32> {
        self.slots.allocate()
    }

    /// Point `slot` at `view`, expected in `ShaderResource` state
    pub fn write_image_view(&self, slot: u32, view: vk::ImageView) -> VulkanResult<()> {
        let set = self.set(slot)?;
        let image_info = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .image_info(&image_info)
            .build();

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    /// Shader-visible handle of an allocated `slot`
    pub fn set(&self, slot: u32) -> VulkanResult<vk::DescriptorSet> {
        if slot >= self.slots.allocated() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Descriptor slot {slot} has not been allocated"),
            });
        }
        Ok(self.sets[slot as usize])
    }

    /// Layout shared by every slot, used for texture-table sets
    #[must_use]
    pub const fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Total number of slots
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.slots.capacity()
    }
}

impl Drop for DescriptorHeap {
    fn drop(&mut self) {
        unsafe {
            // Frees every set allocated from the pool
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_monotonic() {
        let mut slots = SlotAllocator::new(4);
        let taken: Vec<u32> = (0..4).map(|_| slots.allocate().unwrap()).collect();

        assert_eq!(taken, vec![0, 1, 2, 3]);
        assert_eq!(slots.allocated(), 4);
    }

    #[test]
    fn test_exhaustion_reports_capacity() {
        let mut slots = SlotAllocator::new(1);
        slots.allocate().unwrap();

        match slots.allocate() {
            Err(VulkanError::DescriptorHeapExhausted { capacity }) => assert_eq!(capacity, 1),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        // A failed allocation does not advance the counter
        assert_eq!(slots.allocated(), 1);
    }

    #[test]
    fn test_zero_capacity() {
        let mut slots = SlotAllocator::new(0);
        assert!(slots.allocate().is_err());
    }
}
