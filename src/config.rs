//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.meterdash.toml` files.

use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".meterdash.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Backend connection settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Fixed per-source parameters.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Write the report here instead of stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// Billing backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// File holding the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            token_file: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Fixed parameters sent with individual sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Months of history in the dashboard usage trend.
    #[serde(default = "default_usage_months")]
    pub usage_months: u32,

    /// Maximum alerts on the dashboard.
    #[serde(default = "default_list_limit")]
    pub alerts_limit: u32,

    /// Maximum recent activities on the dashboard.
    #[serde(default = "default_list_limit")]
    pub activities_limit: u32,

    /// Months of history in a resident's usage.
    #[serde(default = "default_resident_usage_months")]
    pub resident_usage_months: u32,

    /// Maximum announcements in a resident's view.
    #[serde(default = "default_announcements_limit")]
    pub announcements_limit: u32,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            usage_months: default_usage_months(),
            alerts_limit: default_list_limit(),
            activities_limit: default_list_limit(),
            resident_usage_months: default_resident_usage_months(),
            announcements_limit: default_announcements_limit(),
        }
    }
}

fn default_usage_months() -> u32 {
    6
}

fn default_list_limit() -> u32 {
    10
}

fn default_resident_usage_months() -> u32 {
    12
}

fn default_announcements_limit() -> u32 {
    5
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Maximum rows rendered per list section.
    #[serde(default = "default_max_list_rows")]
    pub max_list_rows: usize,

    /// Include the failure list in reports.
    #[serde(default = "default_true")]
    pub show_failures: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_list_rows: default_max_list_rows(),
            show_failures: true,
        }
    }
}

fn default_max_list_rows() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.meterdash.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values the user actually supplied override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.api_url {
            self.api.base_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = timeout;
        }
        if let Some(ref token_file) = args.token_file {
            self.api.token_file = Some(token_file.clone());
        }

        if let Some(format) = args.format {
            self.general.format = format;
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.clone());
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
