use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::FacingMode;

pub const DEFAULT_CONFIG_FILE: &str = "image_transformer.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub display: DisplayConfig,
    pub endpoint: EndpointConfig,
    pub intake: IntakeConfig,
    pub camera: CameraConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    pub transform_path: String,
    pub file_field: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    pub max_file_bytes: usize,
    pub accepted_mime_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub default_facing: FacingMode,
    /// rpicam camera index treated as the front ("user") camera
    pub user_camera_index: u32,
    /// rpicam camera index treated as the rear ("environment") camera
    pub environment_camera_index: u32,
    pub width: u32,
    pub height: u32,
    /// JPEG quality for captured frames (0.9 quality factor == 90)
    pub jpeg_quality: u8,
    pub frame_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// false selects the plain shown/hidden loading indicator
    pub phased_progress: bool,
    pub phases: Vec<String>,
    pub phase_interval_ms: u64,
    pub completion_label: String,
    pub completion_hide_ms: u64,
    pub toast_duration_ms: u64,
    pub toast_exit_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: DisplayConfig {
                width: 1024,
                height: 768,
            },
            endpoint: EndpointConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
                transform_path: "/transform".to_string(),
                file_field: "file".to_string(),
                timeout_secs: 500,
            },
            intake: IntakeConfig {
                max_file_bytes: 10 * 1024 * 1024,
                accepted_mime_prefix: "image/".to_string(),
            },
            camera: CameraConfig {
                default_facing: FacingMode::User,
                user_camera_index: 1,
                environment_camera_index: 0,
                width: 1280,
                height: 720,
                jpeg_quality: 90,
                frame_interval_ms: 100,
            },
            feedback: FeedbackConfig {
                phased_progress: true,
                phases: vec![
                    "Initializing...".to_string(),
                    "Analyzing image...".to_string(),
                    "Applying transformations...".to_string(),
                    "Generating result...".to_string(),
                ],
                phase_interval_ms: 1000,
                completion_label: "Complete!".to_string(),
                completion_hide_ms: 1000,
                toast_duration_ms: 3000,
                toast_exit_ms: 300,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::platform_default();
            default_config.save_to_file(&config_path)?;
            Ok(default_config)
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| "Failed to parse configuration file")?;

        log::info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
        }

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow::anyhow!("Invalid display dimensions"));
        }

        reqwest::Url::parse(&self.endpoint.base_url)
            .with_context(|| format!("Invalid endpoint base URL: {}", self.endpoint.base_url))?;

        if !self.endpoint.transform_path.starts_with('/') {
            return Err(anyhow::anyhow!("Transform path must start with '/'"));
        }

        if self.endpoint.file_field.is_empty() {
            return Err(anyhow::anyhow!("Multipart file field name is empty"));
        }

        if self.endpoint.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Invalid request timeout"));
        }

        if self.intake.max_file_bytes == 0 {
            return Err(anyhow::anyhow!("Invalid maximum file size"));
        }

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow::anyhow!("Invalid camera resolution"));
        }

        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(anyhow::anyhow!("JPEG quality must be between 1 and 100"));
        }

        if self.camera.user_camera_index == self.camera.environment_camera_index {
            return Err(anyhow::anyhow!(
                "User and environment cameras share index {}",
                self.camera.user_camera_index
            ));
        }

        if self.feedback.phased_progress && self.feedback.phases.is_empty() {
            return Err(anyhow::anyhow!("Phased progress requires at least one phase label"));
        }

        if self.feedback.phase_interval_ms == 0 || self.feedback.toast_duration_ms == 0 {
            return Err(anyhow::anyhow!("Feedback timings must be non-zero"));
        }

        Ok(())
    }

    pub fn transform_url(&self) -> String {
        format!(
            "{}{}",
            self.endpoint.base_url.trim_end_matches('/'),
            self.endpoint.transform_path
        )
    }
}

impl FeedbackConfig {
    pub fn phase_interval(&self) -> Duration {
        Duration::from_millis(self.phase_interval_ms)
    }

    pub fn completion_hide(&self) -> Duration {
        Duration::from_millis(self.completion_hide_ms)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }

    pub fn toast_exit(&self) -> Duration {
        Duration::from_millis(self.toast_exit_ms)
    }
}

// Configuration builder for easier setup
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::from_config(Config::default())
    }

    /// Starts from an already loaded configuration, e.g. to apply command line overrides.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn endpoint(mut self, base_url: &str) -> Self {
        self.config.endpoint.base_url = base_url.to_string();
        self
    }

    pub fn default_facing(mut self, facing: FacingMode) -> Self {
        self.config.camera.default_facing = facing;
        self
    }

    pub fn phased_progress(mut self, enabled: bool) -> Self {
        self.config.feedback.phased_progress = enabled;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// Environment-specific configuration presets
impl Config {
    pub fn platform_default() -> Self {
        if cfg!(target_arch = "aarch64") {
            Self::raspberry_pi_kiosk()
        } else {
            Self::development_desktop()
        }
    }

    pub fn development_desktop() -> Self {
        Config {
            camera: CameraConfig {
                width: 640,
                height: 480,
                ..Config::default().camera
            },
            ..Default::default()
        }
    }

    pub fn raspberry_pi_kiosk() -> Self {
        Config {
            display: DisplayConfig {
                width: 800,
                height: 480,
            },
            camera: CameraConfig {
                default_facing: FacingMode::Environment,
                ..Config::default().camera
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.intake.max_file_bytes, 10_485_760);
        assert_eq!(config.feedback.phases.len(), 4);
        assert_eq!(config.transform_url(), "http://127.0.0.1:8000/transform");
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .endpoint("http://transformer.local:9000/")
            .default_facing(FacingMode::Environment)
            .phased_progress(false)
            .build()
            .unwrap();

        assert_eq!(config.transform_url(), "http://transformer.local:9000/transform");
        assert_eq!(config.camera.default_facing, FacingMode::Environment);
        assert!(!config.feedback.phased_progress);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.camera.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.camera.jpeg_quality = 90;
        config.endpoint.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.endpoint.base_url = "http://localhost:8000".to_string();
        config.feedback.phases.clear();
        assert!(config.validate().is_err());

        config.feedback.phased_progress = false;
        assert!(config.validate().is_ok());

        config.camera.user_camera_index = config.camera.environment_camera_index;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("test_config.toml");

        let original_config = Config::raspberry_pi_kiosk();
        original_config.save_to_file(&config_path).unwrap();

        let loaded_config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(original_config.display.width, loaded_config.display.width);
        assert_eq!(loaded_config.camera.default_facing, FacingMode::Environment);
        assert_eq!(original_config.feedback.phases, loaded_config.feedback.phases);
    }

    #[test]
    fn test_facing_mode_serializes_lowercase() {
        let contents = toml::to_string_pretty(&Config::raspberry_pi_kiosk()).unwrap();
        assert!(contents.contains("default_facing = \"environment\""));
    }

    #[test]
    fn test_preset_configs() {
        assert!(Config::development_desktop().validate().is_ok());
        assert!(Config::raspberry_pi_kiosk().validate().is_ok());
        assert!(Config::platform_default().validate().is_ok());
    }

    #[test]
    fn test_builder_overrides_loaded_config() {
        let config = ConfigBuilder::from_config(Config::raspberry_pi_kiosk())
            .endpoint("https://example.com")
            .build()
            .unwrap();
        assert_eq!(config.display.width, 800);
        assert_eq!(config.transform_url(), "https://example.com/transform");
    }
}
