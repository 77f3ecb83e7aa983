// Backend module - Vulkan abstraction layer
//
// Thin RAII wrappers around ash. Every object holds an Arc to whatever must
// outlive it, so drop order takes care of itself.

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use buffer::{Buffer, UniformBuffers};
pub use command::CommandPool;
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter};
pub use device::VulkanDevice;
pub use instance::Instance;
pub use pipeline::{ColorVertex, GraphicsPipeline, PipelineDesc, RenderPass, TexturedVertex, Vertex, VertexLayout};
pub use shader::ShaderModule;
pub use surface::Surface;
pub use swapchain::{AcquireOutcome, Swapchain};
pub use sync::{FrameCursor, FrameSync, ImageFences};
pub use texture::{DepthBuffer, Texture};
