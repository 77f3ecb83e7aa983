// Shader module loading
//
// Shaders are compiled to SPIR-V by build.rs and loaded at runtime, so a
// shader edit only needs a rebuild of the .spv file.

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::VulkanDevice;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Entry point every stage is expected to export
pub const ENTRY_POINT: &CStr = c"main";

/// Decode SPIR-V bytes into words, checking size and magic number
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        anyhow::bail!("SPIR-V length {} is not a positive multiple of 4", bytes.len());
    }

    // read_spv handles unaligned input and byte-swapped modules
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).context("Failed to read SPIR-V")?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => anyhow::bail!("Bad SPIR-V magic number {:#010x}", other),
        None => anyhow::bail!("Empty SPIR-V module"),
    }
}

pub struct ShaderModule {
    pub module: vk::ShaderModule,
    pub stage: vk::ShaderStageFlags,
    device: Arc<VulkanDevice>,
}

impl ShaderModule {
    pub fn from_bytes(device: Arc<VulkanDevice>, stage: vk::ShaderStageFlags, bytes: &[u8]) -> Result<Self> {
        let code = parse_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;

        Ok(Self {
            module,
            stage,
            device,
        })
    }

    /// Load a compiled .spv file
    pub fn from_file<P: AsRef<Path>>(
        device: Arc<VulkanDevice>,
        stage: vk::ShaderStageFlags,
        path: P,
    ) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read shader {:?} (is glslc installed?)", path))?;

        log::debug!("Loaded shader {:?} ({} bytes)", path, bytes.len());

        Self::from_bytes(device, stage, &bytes).with_context(|| format!("Invalid shader {:?}", path))
    }

    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Path of a compiled shader shipped next to the crate
pub fn shader_path(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("shaders")
        .join(format!("{}.spv", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_valid_header() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_truncated_module() {
        let mut bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.pop();
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn rejects_empty_module() {
        assert!(parse_spirv(&[]).is_err());
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = module_bytes(&[0xdead_beef, 0x0001_0000]);
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn shader_paths_use_spv_suffix() {
        let path = shader_path("triangle.vert");
        assert!(path.ends_with("shaders/triangle.vert.spv"));
    }
}
