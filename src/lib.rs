//! Small Vulkan scaffolding for demos.
//!
//! `backend` wraps the Vulkan objects (instance, device, swapchain,
//! buffers, textures, descriptors, pipelines), `renderer` runs the
//! frames-in-flight loop on top of them and `app` drives a [`app::Demo`]
//! from a winit window.

pub mod app;
pub mod backend;
pub mod config;
pub mod renderer;

pub use app::Demo;
pub use config::Config;
pub use renderer::{FrameContext, Renderer, RendererSettings};
