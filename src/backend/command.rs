// Command pool and one-shot submissions
//
// Per-frame command buffers are allocated here, as are the short-lived
// buffers used for staging uploads and layout transitions.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct CommandPool {
    pub pool: vk::CommandPool,
    queue_family: u32,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    /// Pool on the graphics family whose buffers can be reset individually
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let queue_family = device.queue_families.graphics;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        Ok(Self {
            pool,
            queue_family,
            device,
        })
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")
    }

    pub fn free(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe {
            self.device.device.free_command_buffers(self.pool, command_buffers);
        }
    }

    /// Record `record` into a fresh command buffer, submit it to the graphics
    /// queue and block until it has executed
    pub fn one_time_submit<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let device = &self.device.device;
        let command_buffers = self.allocate(1)?;
        let cmd = command_buffers[0];

        let result = (|| -> Result<()> {
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            unsafe {
                device.begin_command_buffer(cmd, &begin_info)?;
                record(device, cmd);
                device.end_command_buffer(cmd)?;

                let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
                device
                    .queue_submit(self.device.graphics_queue, &[submit_info.build()], vk::Fence::null())
                    .context("Failed to submit one-time commands")?;
                device
                    .queue_wait_idle(self.device.graphics_queue)
                    .context("Failed to wait for one-time commands")?;
            }

            Ok(())
        })();

        self.free(&command_buffers);
        result
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Also frees every command buffer allocated from it
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}
