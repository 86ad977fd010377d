//! Configuration management for ocrchain using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum upload size (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum decoded pixel count (width x height).
pub const DEFAULT_MAX_PIXELS: u64 = 50_000_000;

/// Default timeout shared by the HTTP call and the subprocess, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default OCR.space endpoint.
pub const DEFAULT_OCR_SPACE_URL: &str = "https://api.ocr.space/parse/image";

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },
}

/// Limits applied before any extraction is attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum byte length of an upload.
    pub max_file_size: usize,
    /// Maximum decoded width x height.
    pub max_pixels: u64,
    /// Accepted filename extensions, without the leading dot.
    pub supported_extensions: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_pixels: DEFAULT_MAX_PIXELS,
            supported_extensions: ["jpg", "jpeg", "png", "bmp", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ValidationConfig {
    /// Maximum upload size in whole megabytes, for messages.
    pub fn max_file_size_mb(&self) -> usize {
        self.max_file_size / 1024 / 1024
    }
}

/// OCR.space backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteOcrConfig {
    /// Parse endpoint URL.
    pub endpoint: String,
    /// API key. The backend is unavailable without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Language hint (OCR.space three-letter code).
    pub language: String,
    /// OCR engine variant (1, 2 or 3).
    pub engine: u8,
    /// Fixed confidence reported for this backend.
    pub confidence: f32,
}

impl Default for RemoteOcrConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OCR_SPACE_URL.to_string(),
            api_key: None,
            language: "eng".to_string(),
            engine: 2,
            confidence: 0.85,
        }
    }
}

/// Local Tesseract backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalOcrConfig {
    /// Executable name or path.
    pub binary: String,
    /// Tesseract language (e.g. "eng", "fas+eng").
    pub language: String,
    /// Page segmentation mode passed as `--psm`.
    pub page_segmentation_mode: u8,
    /// Fixed confidence reported for this backend.
    pub confidence: f32,
    /// Install the engine through the system package manager when missing.
    pub auto_install: bool,
    /// Explicit install command, overriding package manager detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_command: Option<Vec<String>>,
    /// Upper bound for each install command, in seconds.
    pub install_timeout_secs: u64,
}

impl Default for LocalOcrConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
            page_segmentation_mode: 6,
            confidence: 0.70,
            auto_install: true,
            install_command: None,
            install_timeout_secs: 600,
        }
    }
}

/// Top-level configuration file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Timeout applied to each backend call, in seconds.
    pub timeout_secs: u64,
    pub validation: ValidationConfig,
    pub remote: RemoteOcrConfig,
    pub local: LocalOcrConfig,
    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            validation: ValidationConfig::default(),
            remote: RemoteOcrConfig::default(),
            local: LocalOcrConfig::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers ocrchain config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("ocrchain").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config file: {}", e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            // No config file found
            Err(_) => Self::default_with_env(),
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OCR_SPACE_API_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(url) = get("OCR_SPACE_URL") {
            self.remote.endpoint = url;
        }
        if let Some(lang) = get("OCR_LANGUAGE") {
            self.remote.language = lang;
        }
        if let Some(binary) = get("TESSERACT_BINARY") {
            self.local.binary = binary;
        }
        if let Some(lang) = get("TESSERACT_LANGUAGE") {
            self.local.language = lang;
        }
        if let Some(secs) = get("OCR_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.timeout_secs = secs;
        }
        if let Some(flag) = get("OCR_AUTO_INSTALL") {
            self.local.auto_install = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }

    /// Timeout applied to each backend call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
