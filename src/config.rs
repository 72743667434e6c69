use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base address of the processing server, e.g. "http://192.168.1.20:5000".
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub preview_width: u32,
    pub preview_height: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    pub config_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://127.0.0.1:5000".to_string(),
            },
            camera: CameraConfig {
                preview_width: 800,
                preview_height: 600,
                jpeg_quality: 85,
            },
            capture: CaptureConfig {
                width: 640,
                height: 480,
            },
            paths: PathConfig {
                config_file: PathBuf::from("photo_uplink.toml"),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("photo_uplink.toml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save()?;
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

    pub fn save(&self) -> Result<()> {
        self.save_to_file(&self.paths.config_file)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        // Ensure parent directory exists
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
        // Validate server address
        if self.server.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Server base URL must not be empty"));
        }

        if !self.server.base_url.starts_with("http://") && !self.server.base_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "Server base URL must start with http:// or https://: {}",
                self.server.base_url
            ));
        }

        // Validate capture raster
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow::anyhow!("Invalid capture dimensions"));
        }

        // Validate camera settings
        if self.camera.preview_width == 0 || self.camera.preview_height == 0 {
            return Err(anyhow::anyhow!("Invalid camera preview dimensions"));
        }

        if self.camera.jpeg_quality > 100 {
            return Err(anyhow::anyhow!(
                "Invalid JPEG quality: {} (expected 0-100)",
                self.camera.jpeg_quality
            ));
        }

        Ok(())
    }

    /// Server base address with any trailing slash stripped.
    pub fn server_base(&self) -> &str {
        self.server.base_url.trim_end_matches('/')
    }

    pub fn upload_url(&self) -> String {
        format!("{}/api/upload", self.server_base())
    }

    pub fn download_url(&self, filename: &str) -> String {
        format!("{}/downloads/{}", self.server_base(), filename)
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
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.capture.height, 480);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.server.base_url = String::new();
        assert!(config.validate().is_err());

        config.server.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config.server.base_url = "http://example.com".to_string();
        config.capture.width = 0;
        assert!(config.validate().is_err());

        config.capture.width = 640;
        config.camera.jpeg_quality = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.server.base_url = "http://10.0.0.7:5000".to_string();
        original_config.save_to_file(&config_path).unwrap();

        let loaded_config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(original_config.server.base_url, loaded_config.server.base_url);
        assert_eq!(original_config.capture.width, loaded_config.capture.width);
        assert_eq!(original_config.camera.jpeg_quality, loaded_config.camera.jpeg_quality);
    }

    #[test]
    fn test_url_construction() {
        let mut config = Config::default();
        config.server.base_url = "http://192.168.1.20:5000".to_string();

        assert_eq!(config.upload_url(), "http://192.168.1.20:5000/api/upload");
        assert_eq!(
            config.download_url("result.png"),
            "http://192.168.1.20:5000/downloads/result.png"
        );

        // Trailing slash on the base must not double up
        config.server.base_url = "http://192.168.1.20:5000/".to_string();
        assert_eq!(config.upload_url(), "http://192.168.1.20:5000/api/upload");
        assert_eq!(
            config.download_url("result.png"),
            "http://192.168.1.20:5000/downloads/result.png"
        );
    }
}
