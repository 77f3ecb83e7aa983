// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Provides sensible defaults if the config file is missing or has errors.
// The path can be overridden with the VKSCAFFOLD_CONFIG environment variable.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

/// Environment variable pointing at an alternative config file
pub const CONFIG_PATH_ENV: &str = "VKSCAFFOLD_CONFIG";

/// Upper bound for frames in flight; more only adds latency
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vkscaffold".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
            resizable: true,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// Case-insensitive substring of the GPU name to favour during selection
    pub preferred_device: Option<String>,
    pub depth_buffer: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.02, 0.02, 0.05, 1.0],
            max_frames_in_flight: 2,
            preferred_device: None,
            depth_buffer: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vkscaffold.log".to_string(),
            show_fps: true,
        }
    }
}

/// Control key bindings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub quit_key: String,
    pub fullscreen_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            quit_key: "Escape".to_string(),
            fullscreen_key: "F11".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from config.toml (or $VKSCAFFOLD_CONFIG), falling back to defaults
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());

        Self::load_from_path(&path).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", path, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Number of frames the CPU may record ahead of the GPU, clamped to 1..=4
    pub fn frames_in_flight(&self) -> usize {
        self.graphics.max_frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT)
    }

    /// Preferred GPU name fragment, ignoring empty strings
    pub fn preferred_device(&self) -> Option<&str> {
        self.graphics
            .preferred_device
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert!(config.graphics.depth_buffer);
        assert_eq!(config.controls.quit_key, "Escape");
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml_str(
            r#"
            [window]
            title = "demo"
            width = 800

            [graphics]
            present_mode = "Mailbox"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.graphics.clear_color, GraphicsConfig::default().clear_color);
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let config = Config::from_toml_str("[graphics]\npresent_mode = \"turbo\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let zero = Config::from_toml_str("[graphics]\nmax_frames_in_flight = 0").unwrap();
        assert_eq!(zero.frames_in_flight(), 1);

        let many = Config::from_toml_str("[graphics]\nmax_frames_in_flight = 16").unwrap();
        assert_eq!(many.frames_in_flight(), MAX_FRAMES_IN_FLIGHT);

        let three = Config::from_toml_str("[graphics]\nmax_frames_in_flight = 3").unwrap();
        assert_eq!(three.frames_in_flight(), 3);
    }

    #[test]
    fn blank_preferred_device_is_ignored() {
        let blank = Config::from_toml_str("[graphics]\npreferred_device = \"  \"").unwrap();
        assert_eq!(blank.preferred_device(), None);

        let named = Config::from_toml_str("[graphics]\npreferred_device = \"radeon\"").unwrap();
        assert_eq!(named.preferred_device(), Some("radeon"));
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(Config::from_toml_str("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert_eq!(config.window.title, "vkscaffold");
    }
}
