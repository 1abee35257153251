//! YAML configuration for the whole intake pipeline.
//!
//! One file configures every stage: admission windows, upload limits,
//! detection client and label policies, result-cache bounds, and dedup
//! radius/window. Any omitted section falls back to the stage defaults.
//!
//! ## Example
//!
//! ```yaml
//! version: "1.0"
//! name: "production"
//!
//! admission:
//!   per_user: { cap: 5, window_secs: 3600 }
//!   per_ip:   { cap: 10, window_secs: 3600 }
//!
//! upload:
//!   max_upload_bytes: 20971520
//!   max_dimension: 1024
//!   jpeg_quality: 85
//!
//! detection:
//!   client:
//!     mode: "api"
//!     api_url: "https://api-inference.huggingface.co/models"
//!     model: "openai/clip-vit-base-patch32"
//!     timeout_secs: 10
//!
//! cache:
//!   ttl_secs: 600
//!   max_entries: 4096
//!
//! dedup:
//!   radius_m: 100.0
//!   window_hours: 24
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use admission::AdmissionConfig;
use dedup::DedupConfig;
use detection::{CacheConfig, DetectionConfig, LabelPolicy};
use upload::UploadConfig;

/// Errors that can occur when loading a pipeline configuration file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration for the intake pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Configuration format version.
    pub version: String,

    /// Optional configuration name/description.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub admission: AdmissionSection,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub detection: DetectionSection,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub dedup: DedupConfig,
}

impl IntakeConfig {
    /// Load a YAML configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: IntakeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.admission.validate()?;

        if self.upload.max_upload_bytes == 0 {
            return Err(ConfigLoadError::Validation(
                "upload.max_upload_bytes must be >= 1".to_string(),
            ));
        }
        if self.upload.max_dimension == 0 {
            return Err(ConfigLoadError::Validation(
                "upload.max_dimension must be >= 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.upload.jpeg_quality) {
            return Err(ConfigLoadError::Validation(
                "upload.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        self.detection.validate()?;

        if self.cache.ttl_secs == 0 {
            return Err(ConfigLoadError::Validation(
                "cache.ttl_secs must be >= 1".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigLoadError::Validation(
                "cache.max_entries must be >= 1".to_string(),
            ));
        }

        self.dedup
            .validate()
            .map_err(|err| ConfigLoadError::Validation(err.to_string()))?;

        Ok(())
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            admission: AdmissionSection::default(),
            upload: UploadConfig::default(),
            detection: DetectionSection::default(),
            cache: CacheConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}

/// Per-user and per-IP window settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdmissionSection {
    #[serde(default = "default_per_user")]
    pub per_user: AdmissionConfig,

    #[serde(default = "default_per_ip")]
    pub per_ip: AdmissionConfig,
}

impl AdmissionSection {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        for (name, cfg) in [("per_user", &self.per_user), ("per_ip", &self.per_ip)] {
            if cfg.cap == 0 {
                return Err(ConfigLoadError::Validation(format!(
                    "admission.{name}.cap must be >= 1"
                )));
            }
            if cfg.window_secs == 0 {
                return Err(ConfigLoadError::Validation(format!(
                    "admission.{name}.window_secs must be >= 1"
                )));
            }
        }
        Ok(())
    }
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            per_user: default_per_user(),
            per_ip: default_per_ip(),
        }
    }
}

/// Classifier client settings plus the label policies to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSection {
    #[serde(default)]
    pub client: DetectionConfig,

    /// Every submitted photo is scored under each of these, independently.
    #[serde(default = "default_policies")]
    pub policies: Vec<LabelPolicy>,
}

impl DetectionSection {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        self.client
            .validate()
            .map_err(|err| ConfigLoadError::Validation(err.to_string()))?;
        if self.policies.is_empty() {
            return Err(ConfigLoadError::Validation(
                "detection.policies must not be empty".to_string(),
            ));
        }
        for policy in &self.policies {
            policy
                .validate()
                .map_err(|err| ConfigLoadError::Validation(err.to_string()))?;
        }
        Ok(())
    }
}

impl Default for DetectionSection {
    fn default() -> Self {
        Self {
            client: DetectionConfig::default(),
            policies: default_policies(),
        }
    }
}

fn default_per_user() -> AdmissionConfig {
    AdmissionConfig::default().with_cap(5).with_window_secs(3600)
}

fn default_per_ip() -> AdmissionConfig {
    AdmissionConfig::default().with_cap(10).with_window_secs(3600)
}

fn default_policies() -> Vec<LabelPolicy> {
    vec![LabelPolicy::vandalism(), LabelPolicy::flooding()]
}
