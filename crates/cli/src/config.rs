//! Configuration management for the muse CLI
//!
//! Handles loading configuration from ~/.mini-muse/config.toml. Command-line
//! flags override file values, which override built-in defaults.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use comfy::{config::positive_secs, ComfyConfig};
use prompts::CaptionConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub comfy: ComfySection,

    #[serde(default)]
    pub caption: CaptionSection,

    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComfySection {
    /// Server address, `host:port` or a full URL
    #[serde(default)]
    pub server: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub poll_interval_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaptionSection {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub instruction: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,

    #[serde(default = "default_image_workflow")]
    pub image_workflow: PathBuf,

    #[serde(default = "default_image_output")]
    pub image_output: PathBuf,

    #[serde(default = "default_video_workflow")]
    pub video_workflow: PathBuf,

    #[serde(default = "default_video_input")]
    pub video_input: PathBuf,

    #[serde(default = "default_video_output")]
    pub video_output: PathBuf,

    #[serde(default = "default_video_processed")]
    pub video_processed: PathBuf,
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("prompts")
}

fn default_image_workflow() -> PathBuf {
    PathBuf::from("workflows/sd3.5_large_turbo_upscale.json")
}

fn default_image_output() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_video_workflow() -> PathBuf {
    PathBuf::from("workflows/wan22_i2v_workflow.json")
}

fn default_video_input() -> PathBuf {
    PathBuf::from("video_input")
}

fn default_video_output() -> PathBuf {
    PathBuf::from("video_output")
}

fn default_video_processed() -> PathBuf {
    PathBuf::from("video_processed")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            prompts_dir: default_prompts_dir(),
            image_workflow: default_image_workflow(),
            image_output: default_image_output(),
            video_workflow: default_video_workflow(),
            video_input: default_video_input(),
            video_output: default_video_output(),
            video_processed: default_video_processed(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mini-muse")
            .join("config.toml")
    }

    /// Load configuration from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Rendering-service settings; `server` and `timeout_secs` come from
    /// the command line when given.
    pub fn comfy_config(&self, server: Option<&str>, timeout_secs: Option<u64>) -> ComfyConfig {
        let mut config = ComfyConfig::default();
        if let Some(address) = server.or(self.comfy.server.as_deref()) {
            config = config.with_base_url(address);
        }
        if let Some(secs) = timeout_secs.or(self.comfy.timeout_secs) {
            config.poll_timeout = Duration::from_secs(secs);
        }
        if let Some(interval) = self.comfy.poll_interval_secs.and_then(positive_secs) {
            config.poll_interval = interval;
        }
        config
    }

    pub fn caption_config(&self, host: Option<&str>, model: Option<&str>) -> CaptionConfig {
        let mut config = CaptionConfig::default();
        if let Some(host) = host.or(self.caption.host.as_deref()) {
            config.host = host.to_string();
        }
        if let Some(model) = model.or(self.caption.model.as_deref()) {
            config.model = model.to_string();
        }
        if let Some(instruction) = &self.caption.instruction {
            config.instruction = instruction.clone();
        }
        if let Some(secs) = self.caption.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}
