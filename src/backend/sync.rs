// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync
// plus the bookkeeping that decides which ones to wait on each frame

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED); // Start signaled so the first wait returns

        unsafe {
            let image_available = create_semaphore(device)?;
            let in_flight_fence = match device.device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(e) => {
                    device.device.destroy_semaphore(image_available, None);
                    return Err(e).context("Failed to create fence");
                }
            };

            Ok(Self {
                image_available,
                in_flight_fence,
            })
        }
    }

    /// Swap in a fresh semaphore and a signaled fence.
    ///
    /// For a slot whose frame failed between acquire and submit. The device
    /// must be idle.
    pub fn renew(&mut self, device: &VulkanDevice) -> Result<()> {
        let fresh = FrameSync::new(device)?;
        let old = std::mem::replace(self, fresh);
        old.destroy(&device.device);
        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

pub fn create_semaphore(device: &VulkanDevice) -> Result<vk::Semaphore> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    unsafe { device.device.create_semaphore(&semaphore_info, None) }
        .context("Failed to create semaphore")
}

/// Which sync slot we're currently using (0 to frames_in_flight - 1)
#[derive(Debug, Clone, Copy)]
pub struct FrameCursor {
    current: usize,
    count: usize,
}

impl FrameCursor {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            current: 0,
            count: frames_in_flight.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.count
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.count;
    }
}

/// Tracks which frame's fence last rendered into each swapchain image.
///
/// The swapchain may hand images back out of order, so an image can still be
/// in use by a different frame slot than the one about to render into it.
#[derive(Debug, Clone, Default)]
pub struct ImageFences {
    fences: Vec<vk::Fence>,
}

impl ImageFences {
    pub fn new(image_count: usize) -> Self {
        Self {
            fences: vec![vk::Fence::null(); image_count],
        }
    }

    /// Forget everything, e.g. after the swapchain was recreated
    pub fn reset(&mut self, image_count: usize) {
        self.fences.clear();
        self.fences.resize(image_count, vk::Fence::null());
    }

    /// Mark `image` as being rendered by `fence`.
    ///
    /// Returns the fence that must be waited on first, if the image is still
    /// owned by another frame.
    pub fn claim(&mut self, image: usize, fence: vk::Fence) -> Option<vk::Fence> {
        let previous = std::mem::replace(&mut self.fences[image], fence);
        (previous != vk::Fence::null() && previous != fence).then_some(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn cursor_cycles_through_frames() {
        let mut cursor = FrameCursor::new(3);
        let seen: Vec<usize> = (0..7)
            .map(|_| {
                let current = cursor.current();
                cursor.advance();
                current
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn cursor_never_has_zero_slots() {
        let mut cursor = FrameCursor::new(0);
        assert_eq!(cursor.frames_in_flight(), 1);
        cursor.advance();
        assert_eq!(cursor.current(), 0);
    }

    #[test]
    fn first_claim_needs_no_wait() {
        let mut fences = ImageFences::new(3);
        assert_eq!(fences.claim(1, vk::Fence::from_raw(10)), None);
    }

    #[test]
    fn claim_by_other_frame_returns_previous_fence() {
        let frame_a = vk::Fence::from_raw(10);
        let frame_b = vk::Fence::from_raw(20);
        let mut fences = ImageFences::new(2);

        fences.claim(0, frame_a);
        assert_eq!(fences.claim(0, frame_b), Some(frame_a));
        assert_eq!(fences.claim(0, frame_a), Some(frame_b));
    }

    #[test]
    fn reclaim_by_same_frame_needs_no_wait() {
        let frame_a = vk::Fence::from_raw(10);
        let mut fences = ImageFences::new(2);

        fences.claim(1, frame_a);
        assert_eq!(fences.claim(1, frame_a), None);
    }

    #[test]
    fn reset_forgets_owners_and_resizes() {
        let mut fences = ImageFences::new(2);
        fences.claim(0, vk::Fence::from_raw(10));
        fences.reset(4);

        assert_eq!(fences.claim(0, vk::Fence::from_raw(20)), None);
        assert_eq!(fences.claim(3, vk::Fence::from_raw(20)), None);
    }
}
