use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Configuration for the diagnosis service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Path to the exported ONNX classifier
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    /// Prefix every diagnosis route is mounted under
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Optional newline separated label file
    #[serde(default)]
    pub class_names_path: Option<PathBuf>,
    /// Upload ceiling in megabytes
    #[serde(default = "default_max_image_size_mb")]
    pub max_image_size_mb: f64,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("Models/disease_detector_v1.onnx")
}
fn default_api_prefix() -> String {
    "/api/disease".to_string()
}
fn default_max_image_size_mb() -> f64 {
    8.0
}
fn default_port() -> u16 {
    8000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            api_prefix: default_api_prefix(),
            class_names_path: None,
            max_image_size_mb: default_max_image_size_mb(),
            port: default_port(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_image_size_mb = match env::var("MAX_IMAGE_SIZE_MB") {
            Ok(raw) => parse_size_mb(&raw)?,
            Err(_) => default_max_image_size_mb(),
        };

        Ok(Self {
            model_path: env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_model_path()),
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| default_api_prefix()),
            class_names_path: env::var("CLASS_NAMES_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            max_image_size_mb,
            port: env::var("PORT")
                .unwrap_or_else(|_| default_port().to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
        })
    }

    /// Largest accepted upload in bytes. An upload is rejected when its length
    /// is strictly greater than this value.
    pub fn max_upload_bytes(&self) -> usize {
        (self.max_image_size_mb * BYTES_PER_MB).floor() as usize
    }

    /// Route prefix with a single leading slash and no trailing slash. The
    /// root prefix is returned as an empty string.
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.api_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

fn parse_size_mb(raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("MAX_IMAGE_SIZE_MB={}", raw)))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::InvalidValue(format!(
            "MAX_IMAGE_SIZE_MB={} (must be a positive number)",
            raw
        )));
    }
    Ok(value)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for: {0}")]
    InvalidValue(String),
}
