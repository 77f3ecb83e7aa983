// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (score candidates, prefer discrete GPU)
// - Graphics + present queue family lookup
// - Logical device + queue creation
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use super::{Instance, Surface};

/// Bonus applied when a device name matches the configured preference.
/// Large enough to outrank any device type.
const PREFERRED_DEVICE_BONUS: u32 = 10_000;

/// Device extensions every candidate must expose
fn required_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Queue family as seen during device selection
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    pub supports_present: bool,
}

impl QueueFamilyInfo {
    fn is_graphics(&self) -> bool {
        self.queue_count > 0 && self.flags.contains(vk::QueueFlags::GRAPHICS)
    }

    fn is_present(&self) -> bool {
        self.queue_count > 0 && self.supports_present
    }
}

/// Queue families used by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Prefer a single family doing both graphics and present,
    /// otherwise the first graphics family and the first present family.
    pub fn find(families: &[QueueFamilyInfo]) -> Option<Self> {
        let shared = families
            .iter()
            .position(|family| family.is_graphics() && family.is_present());

        if let Some(index) = shared {
            return Some(Self {
                graphics: index as u32,
                present: index as u32,
            });
        }

        let graphics = families.iter().position(QueueFamilyInfo::is_graphics)?;
        let present = families.iter().position(QueueFamilyInfo::is_present)?;

        Some(Self {
            graphics: graphics as u32,
            present: present as u32,
        })
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, each needs exactly one DeviceQueueCreateInfo
    pub fn unique(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = [self.graphics, self.present].into_iter().collect();
        set.into_iter().collect()
    }
}

/// Everything device selection needs to know about one physical device
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub max_image_dimension_2d: u32,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub missing_extensions: Vec<String>,
    pub surface_adequate: bool,
    pub sampler_anisotropy: bool,
}

impl DeviceCandidate {
    /// Score this device, `None` when it cannot drive the surface at all
    pub fn score(&self, preferred: Option<&str>) -> Option<u32> {
        if !self.missing_extensions.is_empty() || !self.surface_adequate {
            return None;
        }

        let queues = QueueFamilyIndices::find(&self.queue_families)?;

        let mut score = match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
            vk::PhysicalDeviceType::CPU => 10,
            _ => 1,
        };

        // Larger max texture size usually means a more capable part
        score += self.max_image_dimension_2d / 1024;

        if queues.is_shared() {
            score += 50;
        }

        if let Some(preferred) = preferred {
            if self.name.to_lowercase().contains(&preferred.to_lowercase()) {
                score += PREFERRED_DEVICE_BONUS;
            }
        }

        Some(score)
    }
}

/// Index of the best scoring candidate
pub fn pick_best(candidates: &[DeviceCandidate], preferred: Option<&str>) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter_map(|(i, candidate)| candidate.score(preferred).map(|score| (i, score)))
        // max_by_key keeps the last maximum; reverse so ties go to the first device
        .rev()
        .max_by_key(|&(_, score)| score)
        .map(|(i, _)| i)
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilyIndices,

    // Device properties (cached)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub sampler_anisotropy: bool,

    // Released in Drop before the device is destroyed
    allocator: ManuallyDrop<Mutex<Allocator>>,
    instance: Arc<Instance>,
}

impl VulkanDevice {
    /// Select a GPU able to present to `surface` and create the logical device
    ///
    /// # Arguments
    /// * `preferred` - Case-insensitive substring of the GPU name to favour
    pub fn new(
        instance: Arc<Instance>,
        surface: &Surface,
        preferred: Option<&str>,
    ) -> Result<Arc<Self>> {
        let (physical_device, candidate) =
            Self::pick_physical_device(&instance.instance, surface, preferred)?;

        let queue_families = QueueFamilyIndices::find(&candidate.queue_families)
            .context("Selected GPU lost its queue families")?;

        let (device, graphics_queue, present_queue) = Self::create_logical_device(
            &instance.instance,
            physical_device,
            queue_families,
            candidate.sampler_anisotropy,
        )?;

        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical_device)
        };
        let memory_properties = unsafe {
            instance.instance.get_physical_device_memory_properties(physical_device)
        };

        log::info!("Selected GPU: {} ({:?})", candidate.name, candidate.device_type);
        log::info!("API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version));
        log::debug!("Queue families: {:?}", queue_families);

        let allocator = match Self::create_allocator(&instance.instance, physical_device, &device) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        Ok(Arc::new(Self {
            device,
            physical_device,
            graphics_queue,
            present_queue,
            queue_families,
            properties,
            memory_properties,
            sampler_anisotropy: candidate.sampler_anisotropy,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            instance,
        }))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface: &Surface,
        preferred: Option<&str>,
    ) -> Result<(vk::PhysicalDevice, DeviceCandidate)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let candidates = devices
            .iter()
            .map(|&device| Self::describe(instance, surface, device))
            .collect::<Result<Vec<_>>>()?;

        for candidate in &candidates {
            match candidate.score(preferred) {
                Some(score) => log::debug!("GPU candidate {}: score {}", candidate.name, score),
                None => log::debug!(
                    "GPU candidate {}: unsuitable (missing extensions: {:?}, surface adequate: {})",
                    candidate.name,
                    candidate.missing_extensions,
                    candidate.surface_adequate
                ),
            }
        }

        let best = pick_best(&candidates, preferred)
            .ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))?;

        Ok((devices[best], candidates[best].clone()))
    }

    fn describe(
        instance: &ash::Instance,
        surface: &Surface,
        device: vk::PhysicalDevice,
    ) -> Result<DeviceCandidate> {
        let props = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let queue_families = families
            .iter()
            .enumerate()
            .map(|(i, family)| {
                Ok(QueueFamilyInfo {
                    flags: family.queue_flags,
                    queue_count: family.queue_count,
                    supports_present: surface.supports_present(device, i as u32)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let available = unsafe { instance.enumerate_device_extension_properties(device) }
            .context("Failed to enumerate device extensions")?;

        let available: Vec<&CStr> = available
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect();

        let missing_extensions = required_extensions()
            .iter()
            .filter(|required| !available.contains(*required))
            .map(|required| required.to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        // Only worth querying the surface when the swapchain extension exists
        let surface_adequate =
            missing_extensions.is_empty() && surface.query_support(device)?.is_adequate();

        Ok(DeviceCandidate {
            name: unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            device_type: props.device_type,
            api_version: props.api_version,
            max_image_dimension_2d: props.limits.max_image_dimension2_d,
            queue_families,
            missing_extensions,
            surface_adequate,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilyIndices,
        sampler_anisotropy: bool,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const std::ffi::c_char> = required_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(sampler_anisotropy);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe {
            instance.create_device(physical_device, &create_info, None)
        }
        .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok((device, graphics_queue, present_queue))
    }

    fn create_allocator(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
    ) -> Result<Allocator> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create GPU memory allocator")?;

        Ok(allocator)
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    /// Lock the memory allocator
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock()
    }

    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// First format in `candidates` whose `tiling` features contain `features`
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|&format| {
            let props = unsafe {
                self.instance()
                    .get_physical_device_format_properties(self.physical_device, format)
            };

            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            // Allocator frees its memory blocks, must happen before the device goes away
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, supports_present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            flags,
            queue_count: 1,
            supports_present,
        }
    }

    fn candidate(name: &str, device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            device_type,
            api_version: vk::API_VERSION_1_1,
            max_image_dimension_2d: 16384,
            queue_families: vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true)],
            missing_extensions: Vec::new(),
            surface_adequate: true,
            sampler_anisotropy: true,
        }
    }

    #[test]
    fn shared_family_is_preferred() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::GRAPHICS, true),
        ];

        let indices = QueueFamilyIndices::find(&families).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 2, present: 2 });
        assert!(indices.is_shared());
        assert_eq!(indices.unique(), vec![2]);
    }

    #[test]
    fn split_families_when_nothing_is_shared() {
        let families = [
            family(vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::GRAPHICS, false),
        ];

        let indices = QueueFamilyIndices::find(&families).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 1, present: 0 });
        assert!(!indices.is_shared());
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn empty_families_are_skipped() {
        let families = [
            QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS,
                queue_count: 0,
                supports_present: true,
            },
            family(vk::QueueFlags::GRAPHICS, true),
        ];

        let indices = QueueFamilyIndices::find(&families).unwrap();
        assert_eq!(indices.graphics, 1);
    }

    #[test]
    fn no_present_family_means_no_indices() {
        let families = [family(vk::QueueFlags::GRAPHICS, false)];
        assert!(QueueFamilyIndices::find(&families).is_none());
    }

    #[test]
    fn discrete_outranks_integrated() {
        let discrete = candidate("Discrete", vk::PhysicalDeviceType::DISCRETE_GPU);
        let integrated = candidate("Integrated", vk::PhysicalDeviceType::INTEGRATED_GPU);

        assert!(discrete.score(None).unwrap() > integrated.score(None).unwrap());
        assert_eq!(pick_best(&[integrated, discrete], None), Some(1));
    }

    #[test]
    fn missing_swapchain_extension_is_unsuitable() {
        let mut device = candidate("NoSwapchain", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.missing_extensions = vec!["VK_KHR_swapchain".to_string()];
        assert_eq!(device.score(None), None);
    }

    #[test]
    fn inadequate_surface_is_unsuitable() {
        let mut device = candidate("NoFormats", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.surface_adequate = false;
        assert_eq!(device.score(None), None);
    }

    #[test]
    fn score_adds_image_dimension_and_shared_queue_bonus() {
        let device = candidate("Integrated", vk::PhysicalDeviceType::INTEGRATED_GPU);
        // 100 (integrated) + 16 (16384 / 1024) + 50 (shared family)
        assert_eq!(device.score(None), Some(166));

        let mut split = device.clone();
        split.queue_families = vec![
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::TRANSFER, true),
        ];
        assert_eq!(split.score(None), Some(116));
    }

    #[test]
    fn preferred_name_outranks_device_type() {
        let discrete = candidate("GeForce RTX", vk::PhysicalDeviceType::DISCRETE_GPU);
        let integrated = candidate("Intel UHD Graphics", vk::PhysicalDeviceType::INTEGRATED_GPU);
        let candidates = [discrete, integrated];

        assert_eq!(pick_best(&candidates, None), Some(0));
        assert_eq!(pick_best(&candidates, Some("intel")), Some(1));
        assert_eq!(pick_best(&candidates, Some("no such gpu")), Some(0));
    }

    #[test]
    fn ties_go_to_the_first_device() {
        let a = candidate("A", vk::PhysicalDeviceType::DISCRETE_GPU);
        let b = candidate("B", vk::PhysicalDeviceType::DISCRETE_GPU);
        assert_eq!(pick_best(&[a, b], None), Some(0));
    }

    #[test]
    fn nothing_suitable_picks_nothing() {
        let mut device = candidate("Broken", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.queue_families.clear();
        assert_eq!(pick_best(&[device], None), None);
        assert_eq!(pick_best(&[], None), None);
    }
}
