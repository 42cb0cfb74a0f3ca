//! Configuration management for the stockout scoring service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the upload interface listens on
    pub bind_addr: String,
    /// Largest accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024
}

/// Pipeline artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Remote URL the artifact is fetched from when missing locally
    pub url: String,
    /// Local path of the cached artifact
    pub path: String,
    /// Timeout for the one-time artifact download, in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Index of the "stockout" class in the probability matrix
    #[serde(default = "default_positive_class")]
    pub positive_class: usize,
}

fn default_download_timeout_secs() -> u64 {
    120
}

fn default_onnx_threads() -> usize {
    1
}

fn default_positive_class() -> usize {
    1
}

/// Rendering limits for the result pages
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Rows shown in the normalized-input preview
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    /// Rows shown in the predictions table
    #[serde(default = "default_result_rows")]
    pub result_rows: usize,
}

fn default_preview_rows() -> usize {
    5
}

fn default_result_rows() -> usize {
    20
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            preview_rows: default_preview_rows(),
            result_rows: default_result_rows(),
        }
    }
}

/// Periodic metrics summary configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between logged summaries; 0 disables the reporter
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

fn default_report_interval_secs() -> u64 {
    300
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from the default file, falling back to built-in
    /// defaults when the file does not exist
    pub fn load() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_path(DEFAULT_CONFIG_PATH)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path, with `STOCKOUT__*` overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("STOCKOUT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:8501".to_string(),
                max_upload_bytes: default_max_upload_bytes(),
            },
            model: ModelConfig {
                url: "https://github.com/robertofernandezmartinez/retail-stockout-risk-scoring/releases/download/v1.0/pipe_execution.onnx".to_string(),
                path: "models/pipe_execution.onnx".to_string(),
                download_timeout_secs: default_download_timeout_secs(),
                onnx_threads: default_onnx_threads(),
                positive_class: default_positive_class(),
            },
            scoring: ScoringConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
