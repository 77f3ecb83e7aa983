// Images: sampled textures and depth buffers
//
// Textures are uploaded once through a staging buffer. Depth buffers follow
// the swapchain size and are rebuilt with it.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::path::Path;
use std::sync::Arc;

use super::{Buffer, CommandPool, VulkanDevice};

/// Depth formats in order of preference
const DEPTH_FORMATS: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Access masks and pipeline stages for a layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Masks for the transitions a texture upload needs, `None` for anything else
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<TransitionMasks> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Some(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Some(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => None,
    }
}

/// Record a color image layout transition
pub fn transition_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<()> {
    let masks = transition_masks(old, new)
        .with_context(|| format!("Unsupported layout transition {:?} -> {:?}", old, new))?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access)
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    Ok(())
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Bytes an RGBA8 image of the given size must contain
pub fn rgba8_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

/// Image + allocation, released together
struct AllocatedImage {
    image: vk::Image,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl AllocatedImage {
    fn new(device: Arc<VulkanDevice>, create_info: &vk::ImageCreateInfo, name: &str) -> Result<Self> {
        let image = unsafe { device.device.create_image(create_info, None) }
            .with_context(|| format!("Failed to create image '{}'", name))?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e).with_context(|| format!("Failed to allocate memory for '{}'", name));
            }
        };

        let bound = unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };

        let created = Self {
            image,
            allocation: Some(allocation),
            device,
        };

        bound.with_context(|| format!("Failed to bind memory for '{}'", name))?;

        Ok(created)
    }

    fn create_view(&self, format: vk::Format, aspect_mask: vk::ImageAspectFlags) -> Result<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe { self.device.device.create_image_view(&view_info, None) }
            .context("Failed to create image view")
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().free(allocation) {
                log::error!("Failed to free image memory: {}", e);
            }
        }

        unsafe {
            self.device.device.destroy_image(self.image, None);
        }
    }
}

/// Sampled RGBA8 texture with its view and sampler
pub struct Texture {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub extent: vk::Extent2D,
    image: AllocatedImage,
}

impl Texture {
    /// Load an image file (PNG) and upload it
    pub fn from_file<P: AsRef<Path>>(
        device: Arc<VulkanDevice>,
        pool: &CommandPool,
        path: P,
    ) -> Result<Self> {
        let path = path.as_ref();
        let pixels = image::open(path)
            .with_context(|| format!("Failed to load texture {:?}", path))?
            .to_rgba8();

        let (width, height) = pixels.dimensions();
        log::info!("Loaded texture {:?} ({}x{})", path, width, height);

        Self::from_rgba8(device, pool, width, height, pixels.as_raw(), &path.to_string_lossy())
    }

    /// Upload tightly packed RGBA8 pixels
    pub fn from_rgba8(
        device: Arc<VulkanDevice>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
        name: &str,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("Texture '{}' has zero size", name);
        }

        let expected = rgba8_len(width, height);
        if pixels.len() != expected {
            anyhow::bail!(
                "Texture '{}' is {}x{} and needs {} bytes, got {}",
                name,
                width,
                height,
                expected,
                pixels.len()
            );
        }

        let format = vk::Format::R8G8B8A8_SRGB;
        let extent = vk::Extent2D { width, height };

        let staging = Buffer::with_data(
            device.clone(),
            vk::BufferUsageFlags::TRANSFER_SRC,
            pixels,
            &format!("{} (staging)", name),
        )?;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = AllocatedImage::new(device.clone(), &image_info, name)?;

        let mut recorded = Ok(());
        pool.one_time_submit(|vk_device, cmd| {
            recorded = Self::record_upload(vk_device, cmd, staging.buffer, image.image, extent);
        })?;
        recorded?;

        let view = image.create_view(format, vk::ImageAspectFlags::COLOR)?;

        let sampler = match Self::create_sampler(&device) {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { device.device.destroy_image_view(view, None) };
                return Err(e);
            }
        };

        Ok(Self {
            view,
            sampler,
            extent,
            image,
        })
    }

    fn record_upload(
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        staging: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent2D,
    ) -> Result<()> {
        transition_image_layout(
            device,
            cmd,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .build();

        unsafe {
            device.cmd_copy_buffer_to_image(
                cmd,
                staging,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }

        transition_image_layout(
            device,
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    }

    fn create_sampler(device: &VulkanDevice) -> Result<vk::Sampler> {
        let max_anisotropy = if device.sampler_anisotropy {
            device.properties.limits.max_sampler_anisotropy
        } else {
            1.0
        };

        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(device.sampler_anisotropy)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        unsafe { device.device.create_sampler(&info, None) }.context("Failed to create sampler")
    }

    /// Descriptor info for a combined image sampler binding
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.image.device.device.destroy_sampler(self.sampler, None);
            self.image.device.device.destroy_image_view(self.view, None);
        }
    }
}

/// Depth attachment matching the swapchain extent
pub struct DepthBuffer {
    pub view: vk::ImageView,
    pub format: vk::Format,
    image: AllocatedImage,
}

impl DepthBuffer {
    pub fn new(device: Arc<VulkanDevice>, extent: vk::Extent2D) -> Result<Self> {
        let format = Self::find_format(&device)?;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = AllocatedImage::new(device, &image_info, "depth buffer")?;
        let view = image.create_view(format, vk::ImageAspectFlags::DEPTH)?;

        log::debug!("Created depth buffer {}x{} {:?}", extent.width, extent.height, format);

        Ok(Self {
            view,
            format,
            image,
        })
    }

    /// Depth format the renderer will use on this device
    pub fn find_format(device: &VulkanDevice) -> Result<vk::Format> {
        device
            .find_supported_format(
                &DEPTH_FORMATS,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            )
            .context("No supported depth format")
    }

    pub fn has_stencil(&self) -> bool {
        has_stencil_component(self.format)
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            self.image.device.device.destroy_image_view(self.view, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transitions_are_supported() {
        let to_transfer = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_transfer.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_transfer.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);

        let to_shader = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_shader.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_shader.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_shader.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn other_transitions_are_rejected() {
        assert!(transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        )
        .is_none());
        assert!(transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR).is_none());
    }

    #[test]
    fn rgba8_length() {
        assert_eq!(rgba8_len(2, 3), 24);
        assert_eq!(rgba8_len(0, 128), 0);
    }

    #[test]
    fn stencil_formats() {
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn depth_formats_prefer_pure_depth() {
        assert_eq!(DEPTH_FORMATS[0], vk::Format::D32_SFLOAT);
        assert!(DEPTH_FORMATS[1..].iter().all(|&f| has_stencil_component(f)));
    }
}
