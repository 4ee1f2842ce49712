//! Buffer management for vertex, index and constant data
//!
//! Every buffer lives in host-visible, host-coherent memory. Constant
//! buffers stay persistently mapped so per-frame updates are a plain copy.

use std::marker::PhantomData;

use ash::vk;
use bytemuck::Pod;

use super::device::GraphicsContext;
use super::error::{VulkanError, VulkanResult};
use super::memory;

/// Buffer wrapper with memory management
pub struct GpuBuffer {
    device: ash::Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl GpuBuffer {
    /// Create a host-visible buffer of `size` bytes
    pub fn new(
        context: &GraphicsContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Cannot create an empty buffer".to_string(),
            });
        }

        let device = &context.device;
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory = match memory::allocate(
            context,
            requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok(Self {
            device: device.clone(),
            buffer,
            memory,
            size,
        })
    }

    /// Create a buffer holding `data`
    pub fn with_data<T: Pod>(
        context: &GraphicsContext,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = Self::new(context, bytes.len() as vk::DeviceSize, usage)?;
        buffer.write_bytes(bytes)?;
        Ok(buffer)
    }

    /// Copy `bytes` to the start of the buffer
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Write of {} bytes overflows {}-byte buffer",
                    bytes.len(),
                    self.size
                ),
            });
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    #[must_use]
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size in bytes
    #[must_use]
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Vertex buffer specifically for vertex data
pub struct VertexBuffer {
    buffer: GpuBuffer,
    vertex_count: u32,
}

impl VertexBuffer {
    /// Create vertex buffer with vertex data
    pub fn new<T: Pod>(context: &GraphicsContext, vertices: &[T]) -> VulkanResult<Self> {
        let buffer = GpuBuffer::with_data(context, vertices, vk::BufferUsageFlags::VERTEX_BUFFER)?;
        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
        })
    }

    /// Get buffer handle
    #[must_use]
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Number of vertices stored
    #[must_use]
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// Index buffer for 32-bit indices
pub struct IndexBuffer {
    buffer: GpuBuffer,
    index_count: u32,
}

impl IndexBuffer {
    /// Create index buffer with index data
    pub fn new(context: &GraphicsContext, indices: &[u32]) -> VulkanResult<Self> {
        let buffer = GpuBuffer::with_data(context, indices, vk::BufferUsageFlags::INDEX_BUFFER)?;
        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Get buffer handle
    #[must_use]
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get index count
    #[must_use]
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Persistently mapped uniform buffer holding one `T`
pub struct ConstantBuffer<T> {
    buffer: GpuBuffer,
    mapped: *mut T,
    _phantom: PhantomData<T>,
}

impl<T: Pod> ConstantBuffer<T> {
    /// Create a constant buffer initialised with `initial`
    pub fn new(context: &GraphicsContext, initial: &T) -> VulkanResult<Self> {
        let buffer = GpuBuffer::new(
            context,
            std::mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;

        let mapped = unsafe {
            buffer
                .device
                .map_memory(buffer.memory, 0, buffer.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
                .cast::<T>()
        };

        let constant_buffer = Self {
            buffer,
            mapped,
            _phantom: PhantomData,
        };
        constant_buffer.update(initial);
        Ok(constant_buffer)
    }

    /// Overwrite the buffer contents
    ///
    /// The caller must not update a buffer the GPU may still be reading.
    pub fn update(&self, value: &T) {
        unsafe { self.mapped.write_unaligned(*value) };
    }
}

impl<T> ConstantBuffer<T> {
    /// Get buffer handle
    #[must_use]
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get size in bytes
    #[must_use]
    pub const fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

impl<T> Drop for ConstantBuffer<T> {
    fn drop(&mut self) {
        unsafe { self.buffer.device.unmap_memory(self.buffer.memory) };
    }
}

/// One instance of `T` per frame slot
///
/// Slots rotate once per frame. A slot is reused only after the fence of its
/// previous submission has completed, so a frame never overwrites data the
/// GPU may still read.
#[derive(Debug)]
pub struct FrameBuffered<T> {
    frames: Vec<T>,
}

impl<T> FrameBuffered<T> {
    /// Build `count` instances with `make(frame_index)`
    pub fn try_new<E>(
        count: usize,
        mut make: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<Self, E> {
        let frames = (0..count).map(&mut make).collect::<Result<Vec<_>, E>>()?;
        Ok(Self { frames })
    }

    /// Instance for frame slot `index`
    ///
    /// # Panics
    /// Panics if `index` is not below [`Self::len`].
    #[must_use]
    pub fn get(&self, index: usize) -> &T {
        &self.frames[index]
    }

    /// Mutable instance for frame slot `index`
    ///
    /// # Panics
    /// Panics if `index` is not below [`Self::len`].
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        &mut self.frames[index]
    }

    /// Number of instances
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// `true` when there are no instances
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterate over every instance
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_buffered_indexing() {
        let frames: FrameBuffered<usize> =
            FrameBuffered::try_new(3, |i| Ok::<_, ()>(i * 10)).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(*frames.get(0), 0);
        assert_eq!(*frames.get(2), 20);
        assert_eq!(frames.iter().sum::<usize>(), 30);
    }

    #[test]
    fn test_frame_buffered_propagates_first_error() {
        let mut built = 0;
        let result: Result<FrameBuffered<u32>, String> = FrameBuffered::try_new(4, |i| {
            if i == 2 {
                Err(format!("frame {i} failed"))
            } else {
                built += 1;
                Ok(i as u32)
            }
        });

        assert_eq!(result.unwrap_err(), "frame 2 failed");
        assert_eq!(built, 2);
    }

    #[test]
    fn test_frame_buffered_get_mut() {
        let mut frames: FrameBuffered<Vec<u8>> =
            FrameBuffered::try_new(2, |_| Ok::<_, ()>(Vec::new())).unwrap();
        frames.get_mut(1).push(7);

        assert!(frames.get(0).is_empty());
        assert_eq!(frames.get(1), &vec![7]);
    }
}
