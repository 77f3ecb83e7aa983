// Render pass, framebuffers and graphics pipelines
//
// Pipelines use dynamic viewport and scissor state so they survive a
// swapchain resize; only the render pass and framebuffers are rebuilt.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};
use std::sync::Arc;

use super::{ShaderModule, VulkanDevice};

/// Render pass with one presented color attachment and an optional depth
/// attachment
pub struct RenderPass {
    pub render_pass: vk::RenderPass,
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
    device: Arc<VulkanDevice>,
}

impl RenderPass {
    pub fn new(device: Arc<VulkanDevice>, color_format: vk::Format, depth_format: Option<vk::Format>) -> Result<Self> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];

        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut attachments = vec![color_attachment];
        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);

        if let Some(depth_format) = depth_format {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(depth_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let subpasses = [subpass.build()];
        let dependencies = [external_dependency(depth_format.is_some())];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.device.create_render_pass(&render_pass_info, None) }
            .context("Failed to create render pass")?;

        Ok(Self {
            render_pass,
            color_format,
            depth_format,
            device,
        })
    }

    pub fn has_depth(&self) -> bool {
        self.depth_format.is_some()
    }

    /// Clear values in attachment order
    pub fn clear_values(&self, color: [f32; 4]) -> Vec<vk::ClearValue> {
        let mut values = vec![vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        }];
        if self.has_depth() {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }
        values
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Dependency ordering this pass's attachment writes after earlier work.
///
/// All frames in flight share one depth image, so the depth clear must wait
/// for the previous frame's depth writes, which finish in the late
/// fragment tests.
pub fn external_dependency(has_depth: bool) -> vk::SubpassDependency {
    let mut src_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut dst_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut src_access = vk::AccessFlags::empty();
    let mut dst_access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;

    if has_depth {
        let depth_stages =
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        src_stages |= depth_stages;
        dst_stages |= depth_stages;
        src_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        dst_access |=
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }

    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(src_stages)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stages)
        .dst_access_mask(dst_access)
        .build()
}

/// One framebuffer per swapchain image view, sharing the depth view if any
pub fn create_framebuffers(
    device: &VulkanDevice,
    render_pass: &RenderPass,
    image_views: &[vk::ImageView],
    depth_view: Option<vk::ImageView>,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    if render_pass.has_depth() != depth_view.is_some() {
        anyhow::bail!("Depth view does not match the render pass attachments");
    }

    let mut framebuffers = Vec::with_capacity(image_views.len());

    for &image_view in image_views {
        let mut attachments = vec![image_view];
        attachments.extend(depth_view);

        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.device.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                destroy_framebuffers(device, &framebuffers);
                return Err(e).context("Failed to create framebuffer");
            }
        }
    }

    Ok(framebuffers)
}

pub fn destroy_framebuffers(device: &VulkanDevice, framebuffers: &[vk::Framebuffer]) {
    for &framebuffer in framebuffers {
        unsafe {
            device.device.destroy_framebuffer(framebuffer, None);
        }
    }
}

/// Vertex input layout: one interleaved binding and its attributes
#[derive(Debug, Clone, Default)]
pub struct VertexLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexLayout {
    pub fn new(stride: u32) -> Self {
        Self {
            bindings: vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            attributes: Vec::new(),
        }
    }

    /// Pipelines without vertex buffers (positions generated in the shader)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Next attribute on binding 0, locations assigned in call order
    pub fn attribute(mut self, format: vk::Format, offset: usize) -> Self {
        let location = self.attributes.len() as u32;
        self.attributes.push(vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        });
        self
    }

    /// Check that every attribute fits inside its binding's stride
    pub fn validate(&self) -> Result<()> {
        for attribute in &self.attributes {
            let binding = self
                .bindings
                .iter()
                .find(|b| b.binding == attribute.binding)
                .with_context(|| format!("Attribute {} uses a missing binding", attribute.location))?;

            let size = format_size(attribute.format)
                .with_context(|| format!("Unsupported vertex format {:?}", attribute.format))?;

            if attribute.offset + size > binding.stride {
                anyhow::bail!(
                    "Attribute {} ends at byte {} but the stride is {}",
                    attribute.location,
                    attribute.offset + size,
                    binding.stride
                );
            }
        }
        Ok(())
    }
}

/// Byte size of the float vertex formats
pub fn format_size(format: vk::Format) -> Option<u32> {
    match format {
        vk::Format::R32_SFLOAT => Some(4),
        vk::Format::R32G32_SFLOAT => Some(8),
        vk::Format::R32G32B32_SFLOAT => Some(12),
        vk::Format::R32G32B32A32_SFLOAT => Some(16),
        vk::Format::R8G8B8A8_UNORM => Some(4),
        _ => None,
    }
}

/// Vertex types that can describe their own input layout
pub trait Vertex: Pod {
    fn layout() -> VertexLayout;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex for ColorVertex {
    fn layout() -> VertexLayout {
        VertexLayout::new(size_of::<Self>() as u32)
            .attribute(vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position))
            .attribute(vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color))
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex for TexturedVertex {
    fn layout() -> VertexLayout {
        VertexLayout::new(size_of::<Self>() as u32)
            .attribute(vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position))
            .attribute(vk::Format::R32G32_SFLOAT, offset_of!(Self, uv))
    }
}

/// Everything needed to build a graphics pipeline
pub struct PipelineDesc<'a> {
    pub shaders: &'a [&'a ShaderModule],
    pub vertex_layout: VertexLayout,
    pub set_layouts: &'a [vk::DescriptorSetLayout],
    pub push_constant_ranges: &'a [vk::PushConstantRange],
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub alpha_blend: bool,
}

impl<'a> PipelineDesc<'a> {
    /// Triangle list, back-face culling, counter-clockwise front faces
    pub fn new(shaders: &'a [&'a ShaderModule], vertex_layout: VertexLayout) -> Self {
        Self {
            shaders,
            vertex_layout,
            set_layouts: &[],
            push_constant_ranges: &[],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: false,
            alpha_blend: false,
        }
    }

    pub fn set_layouts(mut self, set_layouts: &'a [vk::DescriptorSetLayout]) -> Self {
        self.set_layouts = set_layouts;
        self
    }

    pub fn push_constants(mut self, ranges: &'a [vk::PushConstantRange]) -> Self {
        self.push_constant_ranges = ranges;
        self
    }

    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn depth_test(mut self, enabled: bool) -> Self {
        self.depth_test = enabled;
        self
    }

    pub fn alpha_blend(mut self, enabled: bool) -> Self {
        self.alpha_blend = enabled;
        self
    }
}

pub fn blend_attachment(alpha_blend: bool) -> vk::PipelineColorBlendAttachmentState {
    let state = vk::PipelineColorBlendAttachmentState::builder().color_write_mask(vk::ColorComponentFlags::RGBA);

    if alpha_blend {
        state
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build()
    } else {
        state.blend_enable(false).build()
    }
}

pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    device: Arc<VulkanDevice>,
}

impl GraphicsPipeline {
    pub fn new(device: Arc<VulkanDevice>, render_pass: &RenderPass, desc: &PipelineDesc) -> Result<Self> {
        if desc.shaders.is_empty() {
            anyhow::bail!("Graphics pipeline needs at least one shader stage");
        }
        if desc.depth_test && !render_pass.has_depth() {
            anyhow::bail!("Depth test requested but the render pass has no depth attachment");
        }
        desc.vertex_layout.validate()?;

        let shader_stages: Vec<_> = desc.shaders.iter().map(|s| s.stage_info()).collect();

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&desc.vertex_layout.bindings)
            .vertex_attribute_descriptions(&desc.vertex_layout.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        // Counts only; the actual viewport and scissor are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [blend_attachment(desc.alpha_blend)];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(desc.set_layouts)
            .push_constant_ranges(desc.push_constant_ranges);

        let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.render_pass)
            .subpass(0)
            .build();

        let created = unsafe {
            device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        let pipeline = match created {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.device.destroy_pipeline_layout(layout, None) };
                return Err(e).context("Failed to create graphics pipeline");
            }
        };

        Ok(Self {
            pipeline,
            layout,
            device,
        })
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_vertex_layout() {
        let layout = ColorVertex::layout();
        assert_eq!(layout.bindings.len(), 1);
        assert_eq!(layout.bindings[0].stride, 24);
        assert_eq!(layout.attributes.len(), 2);
        assert_eq!(layout.attributes[0].location, 0);
        assert_eq!(layout.attributes[0].offset, 0);
        assert_eq!(layout.attributes[1].location, 1);
        assert_eq!(layout.attributes[1].offset, 12);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn textured_vertex_layout() {
        let layout = TexturedVertex::layout();
        assert_eq!(layout.bindings[0].stride, 20);
        assert_eq!(layout.attributes[1].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(layout.attributes[1].offset, 12);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn attribute_past_stride_is_invalid() {
        let layout = VertexLayout::new(16).attribute(vk::Format::R32G32B32_SFLOAT, 8);
        assert!(layout.validate().is_err());
    }

    #[test]
    fn attribute_without_binding_is_invalid() {
        let layout = VertexLayout::empty().attribute(vk::Format::R32_SFLOAT, 0);
        assert!(layout.validate().is_err());
    }

    #[test]
    fn empty_layout_is_valid() {
        assert!(VertexLayout::empty().validate().is_ok());
    }

    #[test]
    fn vertices_cast_to_bytes() {
        let vertices = [ColorVertex {
            position: [0.0, -0.5, 0.0],
            color: [1.0, 0.0, 0.0],
        }];
        assert_eq!(bytemuck::cast_slice::<_, u8>(&vertices).len(), 24);
    }

    #[test]
    fn color_only_dependency_waits_on_color_output() {
        let dependency = external_dependency(false);
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(dependency.dst_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert!(!dependency
            .src_stage_mask
            .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
    }

    #[test]
    fn depth_clear_waits_for_previous_depth_writes() {
        let dependency = external_dependency(true);
        assert!(dependency
            .src_stage_mask
            .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert!(dependency
            .src_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(dependency
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(dependency
            .dst_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn blending_modes() {
        assert_eq!(blend_attachment(false).blend_enable, vk::FALSE);
        let blended = blend_attachment(true);
        assert_eq!(blended.blend_enable, vk::TRUE);
        assert_eq!(blended.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    }
}
