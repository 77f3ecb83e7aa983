// Buffer utilities for vertex, index, and uniform buffers
//
// Memory comes from the device's gpu-allocator instance; host-visible
// buffers stay persistently mapped.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::marker::PhantomData;
use std::sync::Arc;

use super::{CommandPool, VulkanDevice};

/// Size in bytes of a slice as Vulkan sees it
pub fn byte_size<T>(data: &[T]) -> vk::DeviceSize {
    std::mem::size_of_val(data) as vk::DeviceSize
}

/// Check that `len` bytes written at `offset` stay within `capacity`
pub fn check_range(offset: vk::DeviceSize, len: vk::DeviceSize, capacity: vk::DeviceSize) -> Result<()> {
    let end = offset
        .checked_add(len)
        .context("Buffer write range overflows")?;

    if end > capacity {
        anyhow::bail!(
            "Buffer write of {} bytes at offset {} exceeds capacity of {} bytes",
            len,
            offset,
            capacity
        );
    }

    Ok(())
}

/// GPU buffer with its memory allocation
pub struct Buffer {
    pub buffer: vk::Buffer,
    size: vk::DeviceSize,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl Buffer {
    /// Create a buffer with the given usage in `location`
    pub fn new(
        device: Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        if size == 0 {
            anyhow::bail!("Cannot create empty buffer '{}'", name);
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer '{}'", name))?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for '{}'", name));
            }
        };

        let bound = unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };

        let created = Self {
            buffer,
            size,
            allocation: Some(allocation),
            device,
        };

        // On failure `created` drops here and releases what was allocated
        bound.with_context(|| format!("Failed to bind memory for '{}'", name))?;

        Ok(created)
    }

    /// Create a host-visible buffer and fill it with data
    pub fn with_data<T: Pod>(
        device: Arc<VulkanDevice>,
        usage: vk::BufferUsageFlags,
        data: &[T],
        name: &str,
    ) -> Result<Self> {
        let mut buffer = Self::new(device, byte_size(data), usage, MemoryLocation::CpuToGpu, name)?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// Create a device-local buffer filled through a staging copy
    pub fn device_local_with_data<T: Pod>(
        device: Arc<VulkanDevice>,
        pool: &CommandPool,
        usage: vk::BufferUsageFlags,
        data: &[T],
        name: &str,
    ) -> Result<Self> {
        let size = byte_size(data);

        let staging = Self::with_data(
            device.clone(),
            vk::BufferUsageFlags::TRANSFER_SRC,
            data,
            &format!("{} (staging)", name),
        )?;

        let buffer = Self::new(
            device,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            name,
        )?;

        pool.one_time_submit(|device, cmd| unsafe {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
        })?;

        Ok(buffer)
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn is_mapped(&self) -> bool {
        self.allocation
            .as_ref()
            .is_some_and(|allocation| allocation.mapped_ptr().is_some())
    }

    /// Copy data to the start of the buffer (must be host-visible)
    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        self.write_at(0, data)
    }

    /// Copy data to `offset` bytes into the buffer (must be host-visible)
    pub fn write_at<T: Pod>(&mut self, offset: vk::DeviceSize, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        check_range(offset, bytes.len() as vk::DeviceSize, self.size)?;

        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .context("Buffer is not host-visible")?;

        let start = offset as usize;
        mapped[start..start + bytes.len()].copy_from_slice(bytes);

        Ok(())
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }

        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// One host-visible uniform buffer per frame in flight
///
/// Each frame writes its own copy so the CPU never overwrites data the GPU
/// is still reading.
pub struct UniformBuffers<T: Pod> {
    buffers: Vec<Buffer>,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffers<T> {
    pub fn new(device: Arc<VulkanDevice>, frames_in_flight: usize, name: &str) -> Result<Self> {
        let size = std::mem::size_of::<T>() as vk::DeviceSize;

        let buffers = (0..frames_in_flight)
            .map(|frame| {
                Buffer::new(
                    device.clone(),
                    size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryLocation::CpuToGpu,
                    &format!("{} #{}", name, frame),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            buffers,
            _marker: PhantomData,
        })
    }

    pub fn update(&mut self, frame: usize, value: &T) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(frame)
            .with_context(|| format!("No uniform buffer for frame {}", frame))?;
        buffer.write(std::slice::from_ref(value))
    }

    pub fn descriptor_info(&self, frame: usize) -> vk::DescriptorBufferInfo {
        self.buffers[frame].descriptor_info()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_counts_elements_times_stride() {
        let data = [[0.0f32; 3]; 4];
        assert_eq!(byte_size(&data), 48);
        assert_eq!(byte_size::<u16>(&[]), 0);
    }

    #[test]
    fn writes_within_capacity_pass() {
        assert!(check_range(0, 64, 64).is_ok());
        assert!(check_range(32, 32, 64).is_ok());
        assert!(check_range(64, 0, 64).is_ok());
    }

    #[test]
    fn writes_past_capacity_fail() {
        assert!(check_range(0, 65, 64).is_err());
        assert!(check_range(60, 8, 64).is_err());
    }

    #[test]
    fn overflowing_range_fails() {
        assert!(check_range(u64::MAX, 1, u64::MAX).is_err());
    }
}
