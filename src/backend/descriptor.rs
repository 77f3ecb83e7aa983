// Descriptor set layouts, pools and writes

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Builder for a descriptor set layout
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stages)
                .build(),
        );
        self
    }

    pub fn uniform_buffer(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stages)
    }

    pub fn storage_buffer(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, 1, stages)
    }

    pub fn combined_image_sampler(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1, stages)
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    pub fn build(self, device: Arc<VulkanDevice>) -> Result<DescriptorSetLayout> {
        if let Some(binding) = duplicate_binding(&self.bindings) {
            anyhow::bail!("Descriptor binding {} declared twice", binding);
        }

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
            .context("Failed to create descriptor set layout")?;

        Ok(DescriptorSetLayout {
            layout,
            bindings: self.bindings,
            device,
        })
    }
}

fn duplicate_binding(bindings: &[vk::DescriptorSetLayoutBinding]) -> Option<u32> {
    bindings.iter().enumerate().find_map(|(i, a)| {
        bindings[..i]
            .iter()
            .any(|b| b.binding == a.binding)
            .then_some(a.binding)
    })
}

pub struct DescriptorSetLayout {
    pub layout: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
    device: Arc<VulkanDevice>,
}

impl DescriptorSetLayout {
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Pool sizes needed to allocate `sets` sets with these bindings, one entry
/// per descriptor type in order of first appearance
pub fn pool_sizes_for(bindings: &[vk::DescriptorSetLayoutBinding], sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();

    for binding in bindings {
        let count = binding.descriptor_count * sets;
        match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
            Some(size) => size.descriptor_count += count,
            None => sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: count,
            }),
        }
    }

    sizes
}

pub struct DescriptorPool {
    pub pool: vk::DescriptorPool,
    max_sets: u32,
    device: Arc<VulkanDevice>,
}

impl DescriptorPool {
    pub fn new(device: Arc<VulkanDevice>, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> Result<Self> {
        if max_sets == 0 || pool_sizes.is_empty() {
            anyhow::bail!("Descriptor pool needs at least one set and one pool size");
        }

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.device.create_descriptor_pool(&create_info, None) }
            .context("Failed to create descriptor pool")?;

        Ok(Self {
            pool,
            max_sets,
            device,
        })
    }

    /// Pool big enough for `sets` sets of `layout`
    pub fn for_layout(device: Arc<VulkanDevice>, layout: &DescriptorSetLayout, sets: u32) -> Result<Self> {
        Self::new(device, sets, &pool_sizes_for(layout.bindings(), sets))
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    /// Allocate `count` sets sharing one layout
    pub fn allocate(&self, layout: &DescriptorSetLayout, count: usize) -> Result<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.layout; count];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        unsafe { self.device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            // Sets allocated from the pool go with it
            self.device.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum PendingInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    info: PendingInfo,
}

/// Collects descriptor writes and applies them in one update call
#[derive(Default)]
pub struct DescriptorWriter {
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    ) -> Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            ty,
            info: PendingInfo::Buffer(info),
        });
        self
    }

    pub fn uniform_buffer(self, set: vk::DescriptorSet, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.buffer(set, binding, vk::DescriptorType::UNIFORM_BUFFER, info)
    }

    pub fn storage_buffer(self, set: vk::DescriptorSet, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.buffer(set, binding, vk::DescriptorType::STORAGE_BUFFER, info)
    }

    pub fn combined_image_sampler(mut self, set: vk::DescriptorSet, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            info: PendingInfo::Image(info),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn update(self, device: &VulkanDevice) {
        if self.writes.is_empty() {
            return;
        }

        // The infos live in `self.writes` until the call returns
        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|pending| {
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(pending.set)
                    .dst_binding(pending.binding)
                    .dst_array_element(0)
                    .descriptor_type(pending.ty);

                match &pending.info {
                    PendingInfo::Buffer(info) => write.buffer_info(std::slice::from_ref(info)).build(),
                    PendingInfo::Image(info) => write.image_info(std::slice::from_ref(info)).build(),
                }
            })
            .collect();

        unsafe {
            device.device.update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_bindings() -> Vec<vk::DescriptorSetLayoutBinding> {
        DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .bindings()
            .to_vec()
    }

    #[test]
    fn builder_records_bindings_in_order() {
        let bindings = quad_bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[1].descriptor_count, 1);
    }

    #[test]
    fn pool_sizes_scale_with_set_count() {
        let sizes = pool_sizes_for(&quad_bindings(), 3);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 3);
    }

    #[test]
    fn pool_sizes_merge_same_type() {
        let bindings = DescriptorSetLayoutBuilder::new()
            .storage_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .uniform_buffer(1, vk::ShaderStageFlags::VERTEX)
            .storage_buffer(2, vk::ShaderStageFlags::COMPUTE)
            .binding(3, vk::DescriptorType::STORAGE_BUFFER, 4, vk::ShaderStageFlags::COMPUTE)
            .bindings()
            .to_vec();

        let sizes = pool_sizes_for(&bindings, 2);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 12);
        assert_eq!(sizes[1].descriptor_count, 2);
    }

    #[test]
    fn no_bindings_no_pool_sizes() {
        assert!(pool_sizes_for(&[], 4).is_empty());
    }

    #[test]
    fn duplicate_bindings_are_found() {
        let bindings = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .bindings()
            .to_vec();
        assert_eq!(duplicate_binding(&bindings), Some(0));
        assert_eq!(duplicate_binding(&quad_bindings()), None);
    }

    #[test]
    fn writer_batches_writes() {
        let writer = DescriptorWriter::new()
            .uniform_buffer(vk::DescriptorSet::null(), 0, vk::DescriptorBufferInfo::default())
            .combined_image_sampler(vk::DescriptorSet::null(), 1, vk::DescriptorImageInfo::default());
        assert_eq!(writer.len(), 2);
        assert!(DescriptorWriter::new().is_empty());
    }

    #[test]
    fn writer_keeps_image_writes_as_samplers() {
        let image = vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let writer = DescriptorWriter::new()
            .combined_image_sampler(vk::DescriptorSet::null(), 1, image)
            .combined_image_sampler(vk::DescriptorSet::null(), 2, image);

        assert_eq!(writer.len(), 2);
        for (pending, binding) in writer.writes.iter().zip([1, 2]) {
            assert_eq!(pending.binding, binding);
            assert_eq!(pending.ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
            match &pending.info {
                PendingInfo::Image(info) => {
                    assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                }
                PendingInfo::Buffer(_) => panic!("image write stored as a buffer write"),
            }
        }
    }
}
