// Triangle demo
//
// One vertex-colored triangle in a device-local vertex buffer, spun by a
// push-constant transform.

use anyhow::Result;
use ash::vk;
use glam::{Mat4, Vec3};
use vkscaffold::backend::shader::shader_path;
use vkscaffold::backend::{Buffer, ColorVertex, GraphicsPipeline, PipelineDesc, ShaderModule, Vertex};
use vkscaffold::{Demo, FrameContext, Renderer};

const VERTICES: [ColorVertex; 3] = [
    ColorVertex {
        position: [0.0, -0.5, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    ColorVertex {
        position: [0.5, 0.5, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    ColorVertex {
        position: [-0.5, 0.5, 0.0],
        color: [0.0, 0.0, 1.0],
    },
];

/// Radians per second
const SPIN_SPEED: f32 = 0.8;

struct Triangle {
    vertex_buffer: Buffer,
    pipeline: GraphicsPipeline,
    angle: f32,
    aspect: f32,
}

impl Demo for Triangle {
    fn init(renderer: &Renderer) -> Result<Self> {
        let device = renderer.device().clone();

        let vertex_buffer = Buffer::device_local_with_data(
            device.clone(),
            renderer.command_pool(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &VERTICES,
            "triangle vertices",
        )?;

        let vert = ShaderModule::from_file(device.clone(), vk::ShaderStageFlags::VERTEX, shader_path("triangle.vert"))?;
        let frag = ShaderModule::from_file(device.clone(), vk::ShaderStageFlags::FRAGMENT, shader_path("triangle.frag"))?;

        let push_constants = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<Mat4>() as u32,
        }];

        let shaders = [&vert, &frag];
        let desc = PipelineDesc::new(&shaders, ColorVertex::layout())
            .push_constants(&push_constants)
            .cull_mode(vk::CullModeFlags::NONE);

        // Shader modules can go once the pipeline exists
        let pipeline = GraphicsPipeline::new(device, renderer.render_pass(), &desc)?;

        Ok(Self {
            vertex_buffer,
            pipeline,
            angle: 0.0,
            aspect: renderer.aspect_ratio(),
        })
    }

    fn update(&mut self, renderer: &Renderer, dt: f32) {
        self.angle = (self.angle + SPIN_SPEED * dt) % std::f32::consts::TAU;
        self.aspect = renderer.aspect_ratio();
    }

    fn record(&mut self, frame: &mut FrameContext) -> Result<()> {
        // Keep the triangle's proportions when the window is not square
        let transform = Mat4::from_scale(Vec3::new(1.0 / self.aspect, 1.0, 1.0)) * Mat4::from_rotation_z(self.angle);

        frame.bind_pipeline(&self.pipeline);
        frame.bind_vertex_buffer(&self.vertex_buffer);
        frame.push_constants(vk::ShaderStageFlags::VERTEX, &transform)?;
        frame.draw(VERTICES.len() as u32);
        Ok(())
    }
}

fn main() -> Result<()> {
    vkscaffold::app::main::<Triangle>()
}
