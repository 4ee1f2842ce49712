//! Command queue with a monotonic timeline fence
//!
//! Every submission signals the queue's timeline semaphore with the next
//! fence value. Command allocators are tagged with the value of the
//! submission that used them and only recycled once the GPU has passed it.

use ash::extensions::khr::PushDescriptor;
use ash::vk;
use std::collections::VecDeque;

use super::command_list::CommandList;
use super::device::GraphicsContext;
use super::error::{VulkanError, VulkanResult};

/// FIFO of allocators waiting for their fence value to complete
#[derive(Debug)]
pub struct AllocatorPool<A> {
    in_flight: VecDeque<(u64, A)>,
}

impl<A> Default for AllocatorPool<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> AllocatorPool<A> {
    /// Create an empty pool
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_flight: VecDeque::new(),
        }
    }

    /// Take the oldest allocator if the GPU has reached its fence value
    pub fn reclaim(&mut self, completed_value: u64) -> Option<A> {
        match self.in_flight.front() {
            Some((fence_value, _)) if *fence_value <= completed_value => {
                self.in_flight.pop_front().map(|(_, allocator)| allocator)
            }
            _ => None,
        }
    }

    /// Park an allocator until `fence_value` completes
    pub fn retire(&mut self, fence_value: u64, allocator: A) {
        self.in_flight.push_back((fence_value, allocator));
    }

    /// Number of parked allocators
    #[must_use]
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// `true` when no allocator is parked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Remove every parked allocator regardless of fence state
    pub fn drain(&mut self) -> impl Iterator<Item = A> + '_ {
        self.in_flight.drain(..).map(|(_, allocator)| allocator)
    }
}

/// A command pool with its single primary command buffer
#[derive(Debug)]
pub(crate) struct CommandAllocator {
    pub(crate) pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
}

impl CommandAllocator {
    fn new(device: &ash::Device, family_index: u32) -> VulkanResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(family_index);
        let pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self {
            pool,
            command_buffer,
        })
    }

    pub(crate) fn destroy(self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// A GPU submission queue with its completion fence
pub struct CommandQueue {
    device: ash::Device,
    push_descriptor: PushDescriptor,
    queue: vk::Queue,
    family_index: u32,
    timeline: vk::Semaphore,
    fence_value: u64,
    allocators: AllocatorPool<CommandAllocator>,
    allocators_created: usize,
}

impl CommandQueue {
    /// Wrap queue 0 of the context's queue family
    pub fn new(context: &GraphicsContext) -> VulkanResult<Self> {
        let device = context.device.clone();
        let queue = unsafe { device.get_device_queue(context.queue_family_index, 0) };

        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let semaphore_info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);
        let timeline = unsafe {
            device
                .create_semaphore(&semaphore_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!("Command queue created on family {}", context.queue_family_index);

        Ok(Self {
            device,
            push_descriptor: context.push_descriptor.clone(),
            queue,
            family_index: context.queue_family_index,
            timeline,
            fence_value: 0,
            allocators: AllocatorPool::new(),
            allocators_created: 0,
        })
    }

    /// Raw queue handle
    #[must_use]
    pub const fn handle(&self) -> vk::Queue {
        self.queue
    }

    /// Last fence value handed out by a submission
    #[must_use]
    pub const fn fence_value(&self) -> u64 {
        self.fence_value
    }

    /// Begin recording a new command list.
    ///
    /// Reuses the oldest allocator the GPU has finished with, otherwise
    /// creates a new one.
    pub fn get_command_list(&mut self) -> VulkanResult<CommandList> {
        let completed = self.completed_value()?;
        let allocator = match self.allocators.reclaim(completed) {
            Some(allocator) => {
                unsafe {
                    self.device
                        .reset_command_pool(allocator.pool, vk::CommandPoolResetFlags::empty())
                        .map_err(VulkanError::Api)?;
                }
                allocator
            }
            None => {
                let allocator = CommandAllocator::new(&self.device, self.family_index)?;
                self.allocators_created += 1;
                log::debug!("Command allocator #{} created", self.allocators_created);
                allocator
            }
        };

        CommandList::begin(self.device.clone(), self.push_descriptor.clone(), allocator)
    }

    /// Close and submit `list`; returns the fence value that marks its completion
    pub fn execute_command_list(&mut self, list: CommandList) -> VulkanResult<u64> {
        self.execute_with_semaphores(list, &[], &[])
    }

    /// Submit a frame's list, waiting on `wait` at color output and
    /// signaling `signal` for the presentation engine
    pub fn execute_for_present(
        &mut self,
        list: CommandList,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
    ) -> VulkanResult<u64> {
        self.execute_with_semaphores(
            list,
            &[(wait, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)],
            &[signal],
        )
    }

    fn execute_with_semaphores(
        &mut self,
        mut list: CommandList,
        waits: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signals: &[vk::Semaphore],
    ) -> VulkanResult<u64> {
        let allocator = list.close()?;
        let command_buffers = [allocator.command_buffer];

        match self.submit(&command_buffers, waits, signals) {
            Ok(fence_value) => {
                self.allocators.retire(fence_value, allocator);
                log::trace!("Command list submitted (fence {})", fence_value);
                Ok(fence_value)
            }
            Err(e) => {
                allocator.destroy(&self.device);
                Err(e)
            }
        }
    }

    /// Signal the next fence value once all prior work completes
    pub fn signal(&mut self) -> VulkanResult<u64> {
        self.submit(&[], &[], &[])
    }

    /// Consume a pending binary semaphore signal without doing any work
    pub fn drain_semaphore(&mut self, semaphore: vk::Semaphore) -> VulkanResult<u64> {
        self.submit(&[], &[(semaphore, vk::PipelineStageFlags::ALL_COMMANDS)], &[])
    }

    fn submit(
        &mut self,
        command_buffers: &[vk::CommandBuffer],
        waits: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signals: &[vk::Semaphore],
    ) -> VulkanResult<u64> {
        let value = self.fence_value + 1;

        let wait_semaphores: Vec<vk::Semaphore> = waits.iter().map(|(s, _)| *s).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = waits.iter().map(|(_, st)| *st).collect();
        let wait_values = vec![0_u64; waits.len()];

        let mut signal_semaphores = signals.to_vec();
        signal_semaphores.push(self.timeline);
        let mut signal_values = vec![0_u64; signals.len()];
        signal_values.push(value);

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::builder()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(&signal_semaphores)
            .push_next(&mut timeline_info);

        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
        }

        self.fence_value = value;
        Ok(value)
    }

    /// Highest fence value the GPU has completed
    pub fn completed_value(&self) -> VulkanResult<u64> {
        unsafe {
            self.device
                .get_semaphore_counter_value(self.timeline)
                .map_err(VulkanError::Api)
        }
    }

    /// Whether the GPU has reached `fence_value`
    pub fn is_fence_complete(&self, fence_value: u64) -> VulkanResult<bool> {
        Ok(self.completed_value()? >= fence_value)
    }

    /// Block until the GPU reaches `fence_value`. No timeout.
    pub fn fence_wait(&self, fence_value: u64) -> VulkanResult<()> {
        if self.is_fence_complete(fence_value)? {
            return Ok(());
        }

        let semaphores = [self.timeline];
        let values = [fence_value];
        let wait_info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);

        unsafe {
            self.device
                .wait_semaphores(&wait_info, u64::MAX)
                .map_err(VulkanError::Api)
        }
    }

    /// Block until every submission so far has retired
    pub fn flush(&mut self) -> VulkanResult<()> {
        let fence_value = self.signal()?;
        self.fence_wait(fence_value)?;
        log::debug!("Queue flushed at fence {}", fence_value);
        Ok(())
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        for allocator in self.allocators.drain() {
            allocator.destroy(&self.device);
        }
        unsafe { self.device.destroy_semaphore(self.timeline, None) };
        log::debug!("Command queue destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaim_waits_for_fence() {
        let mut pool = AllocatorPool::new();
        pool.retire(1, "a");
        pool.retire(2, "b");

        assert_eq!(pool.reclaim(0), None);
        assert_eq!(pool.reclaim(1), Some("a"));
        assert_eq!(pool.reclaim(1), None);
        assert_eq!(pool.reclaim(5), Some("b"));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_bounded_by_frames_in_flight() {
        // Simulates a frame loop that keeps two submissions in flight
        let mut pool: AllocatorPool<usize> = AllocatorPool::new();
        let mut created = 0;
        let mut fence_value = 0_u64;

        for _ in 0..100 {
            let completed = fence_value.saturating_sub(2);
            let allocator = pool.reclaim(completed).unwrap_or_else(|| {
                created += 1;
                created
            });
            fence_value += 1;
            pool.retire(fence_value, allocator);
        }

        assert_eq!(created, 3);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_reclaim_is_fifo() {
        let mut pool = AllocatorPool::new();
        pool.retire(3, 'x');
        pool.retire(4, 'y');
        assert_eq!(pool.reclaim(10), Some('x'));
        assert_eq!(pool.drain().collect::<Vec<_>>(), vec!['y']);
    }
}
