// Textured quad demo
//
// Indexed quad sampling a texture, with its model-view-projection matrices
// in a uniform buffer per frame in flight.

use anyhow::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::path::Path;
use vkscaffold::backend::shader::shader_path;
use vkscaffold::backend::{
    Buffer, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter, GraphicsPipeline,
    PipelineDesc, ShaderModule, TexturedVertex, Texture, UniformBuffers, Vertex,
};
use vkscaffold::{Demo, FrameContext, Renderer};

const VERTICES: [TexturedVertex; 4] = [
    TexturedVertex {
        position: [-0.5, -0.5, 0.0],
        uv: [0.0, 0.0],
    },
    TexturedVertex {
        position: [0.5, -0.5, 0.0],
        uv: [1.0, 0.0],
    },
    TexturedVertex {
        position: [0.5, 0.5, 0.0],
        uv: [1.0, 1.0],
    },
    TexturedVertex {
        position: [-0.5, 0.5, 0.0],
        uv: [0.0, 1.0],
    },
];

const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

const TEXTURE_FILE: &str = "assets/texture.png";
const CHECKER_SIZE: u32 = 256;
const CHECKER_CELL: u32 = 32;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Transforms {
    model: Mat4,
    view: Mat4,
    proj: Mat4,
}

/// RGBA8 checkerboard used when no texture file is available
fn checkerboard(size: u32, cell: u32) -> Vec<u8> {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / cell) + (y / cell)) % 2 == 0;
            let value = if light { 230 } else { 40 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

fn transforms(time: f32, aspect: f32) -> Transforms {
    let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
    // Vulkan clip space has Y pointing down
    proj.y_axis.y *= -1.0;

    Transforms {
        model: Mat4::from_rotation_z(time * 0.5) * Mat4::from_rotation_x(-0.6),
        view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO, Vec3::Y),
        proj,
    }
}

struct TexturedQuad {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    // Read through the descriptor sets
    _texture: Texture,
    uniforms: UniformBuffers<Transforms>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    // Sets are freed with the pool
    _descriptor_pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,
    pipeline: GraphicsPipeline,
    time: f32,
    aspect: f32,
}

impl TexturedQuad {
    fn load_texture(renderer: &Renderer) -> Result<Texture> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(TEXTURE_FILE);
        let device = renderer.device().clone();

        match Texture::from_file(device.clone(), renderer.command_pool(), &path) {
            Ok(texture) => Ok(texture),
            Err(e) => {
                log::warn!("{:#}, using a checkerboard", e);
                Texture::from_rgba8(
                    device,
                    renderer.command_pool(),
                    CHECKER_SIZE,
                    CHECKER_SIZE,
                    &checkerboard(CHECKER_SIZE, CHECKER_CELL),
                    "checkerboard",
                )
            }
        }
    }
}

impl Demo for TexturedQuad {
    fn init(renderer: &Renderer) -> Result<Self> {
        let device = renderer.device().clone();
        let frames = renderer.frames_in_flight();

        let vertex_buffer = Buffer::device_local_with_data(
            device.clone(),
            renderer.command_pool(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &VERTICES,
            "quad vertices",
        )?;
        let index_buffer = Buffer::device_local_with_data(
            device.clone(),
            renderer.command_pool(),
            vk::BufferUsageFlags::INDEX_BUFFER,
            &INDICES,
            "quad indices",
        )?;

        let texture = Self::load_texture(renderer)?;
        let uniforms = UniformBuffers::new(device.clone(), frames, "quad transforms")?;

        let set_layout = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .build(device.clone())?;

        let descriptor_pool = DescriptorPool::for_layout(device.clone(), &set_layout, frames as u32)?;
        let descriptor_sets = descriptor_pool.allocate(&set_layout, frames)?;

        let writer = descriptor_sets
            .iter()
            .enumerate()
            .fold(DescriptorWriter::new(), |writer, (frame, &set)| {
                writer
                    .uniform_buffer(set, 0, uniforms.descriptor_info(frame))
                    .combined_image_sampler(set, 1, texture.descriptor_info())
            });
        writer.update(&device);

        let vert = ShaderModule::from_file(device.clone(), vk::ShaderStageFlags::VERTEX, shader_path("textured.vert"))?;
        let frag = ShaderModule::from_file(device.clone(), vk::ShaderStageFlags::FRAGMENT, shader_path("textured.frag"))?;

        let shaders = [&vert, &frag];
        let set_layouts = [set_layout.layout];
        let desc = PipelineDesc::new(&shaders, TexturedVertex::layout())
            .set_layouts(&set_layouts)
            .cull_mode(vk::CullModeFlags::NONE)
            .depth_test(renderer.render_pass().has_depth());

        let pipeline = GraphicsPipeline::new(device, renderer.render_pass(), &desc)?;

        log::info!(
            "Quad ready: {}x{} texture, {} descriptor sets",
            texture.extent.width,
            texture.extent.height,
            descriptor_sets.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            _texture: texture,
            uniforms,
            descriptor_sets,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            pipeline,
            time: 0.0,
            aspect: renderer.aspect_ratio(),
        })
    }

    fn update(&mut self, renderer: &Renderer, dt: f32) {
        self.time += dt;
        self.aspect = renderer.aspect_ratio();
    }

    fn record(&mut self, frame: &mut FrameContext) -> Result<()> {
        let index = frame.frame_index();

        // This frame's fence has been waited on, so its buffer is free to write
        self.uniforms.update(index, &transforms(self.time, self.aspect))?;

        frame.bind_pipeline(&self.pipeline);
        frame.bind_vertex_buffer(&self.vertex_buffer);
        frame.bind_index_buffer(&self.index_buffer, vk::IndexType::UINT16);
        frame.bind_descriptor_sets(&self.descriptor_sets[index..=index])?;
        frame.draw_indexed(INDICES.len() as u32);
        Ok(())
    }
}

fn main() -> Result<()> {
    vkscaffold::app::main::<TexturedQuad>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkerboard_alternates_cells() {
        let pixels = checkerboard(4, 2);
        assert_eq!(pixels.len(), 64);

        let pixel = |x: usize, y: usize| pixels[(y * 4 + x) * 4];
        assert_eq!(pixel(0, 0), 230);
        assert_eq!(pixel(1, 1), 230);
        assert_eq!(pixel(2, 0), 40);
        assert_eq!(pixel(0, 2), 40);
        assert_eq!(pixel(2, 2), 230);
        assert!(pixels.chunks(4).all(|p| p[3] == 255));
    }

    #[test]
    fn transforms_are_finite() {
        let t = transforms(1.5, 16.0 / 9.0);
        assert!(t.model.is_finite() && t.view.is_finite() && t.proj.is_finite());
        assert!(t.proj.y_axis.y < 0.0);
    }

    #[test]
    fn quad_indices_stay_in_range() {
        assert!(INDICES.iter().all(|&i| (i as usize) < VERTICES.len()));
    }
}
