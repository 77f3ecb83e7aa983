// Surface - Connection between Vulkan and a window
//
// Any window exposing raw window/display handles can be rendered to.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;

use super::Instance;

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: khr::Surface,
    // Keeps the instance alive until the surface is destroyed
    instance: Arc<Instance>,
}

/// What a physical device can do with this surface
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain needs at least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

impl Surface {
    pub fn new<W>(instance: Arc<Instance>, window: &W) -> Result<Arc<Self>>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .context("Failed to create window surface")?;

        let loader = khr::Surface::new(&instance.entry, &instance.instance);

        Ok(Arc::new(Self {
            surface,
            loader,
            instance,
        }))
    }

    /// Can `queue_family` of `physical_device` present to this surface
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.surface)
                .context("Failed to query surface present support")
        }
    }

    pub fn query_support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .context("Failed to query surface capabilities")?;

            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .context("Failed to query surface formats")?;

            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .context("Failed to query surface present modes")?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn support_without_formats_is_inadequate() {
        let support = SurfaceSupport {
            present_modes: vec![vk::PresentModeKHR::FIFO],
            ..Default::default()
        };
        assert!(!support.is_adequate());
    }

    #[test]
    fn support_without_present_modes_is_inadequate() {
        let support = SurfaceSupport {
            formats: vec![vk::SurfaceFormatKHR::default()],
            ..Default::default()
        };
        assert!(!support.is_adequate());
    }

    #[test]
    fn support_with_format_and_mode_is_adequate() {
        let support = SurfaceSupport {
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
            ..Default::default()
        };
        assert!(support.is_adequate());
    }
}
