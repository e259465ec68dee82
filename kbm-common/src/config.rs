//! Configuration loading and config file resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: a warning is logged and the
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "KBM_CONFIG";
/// Environment override for `server_url`
pub const ENV_SERVER_URL: &str = "KBM_SERVER_URL";
/// Environment override for `page_size`
pub const ENV_PAGE_SIZE: &str = "KBM_PAGE_SIZE";
/// Environment override for `logging.level`
pub const ENV_LOG_LEVEL: &str = "KBM_LOG_LEVEL";

/// Upper bound accepted for `page_size`
pub const MAX_PAGE_SIZE: u64 = 500;

/// Top-level configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbmConfig {
    /// Base URL of the knowledge base service
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Library entries per page
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Per-request timeout for the HTTP client
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upload validation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Hard limit for the single-file flow, advisory limit for batches
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Filename extensions considered supported (lowercase, no dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// MIME types considered supported
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
}

/// Notification timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Seconds before a success toast clears itself
    #[serde(default = "default_success_dismiss_secs")]
    pub success_dismiss_secs: u64,
}

/// Library mutation behavior
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default)]
    pub delete_failure_policy: DeleteFailurePolicy,
}

/// What happens to an optimistically removed entry when the remote delete fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteFailurePolicy {
    /// Leave the entry removed; the next page fetch reconciles
    #[default]
    KeepRemoved,
    /// Put the entry back at its previous page position
    RollBack,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080/api/knowledge".to_string()
}

fn default_page_size() -> u64 {
    20
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_file_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "txt", "md", "markdown", "html", "htm", "doc", "docx", "odt", "rtf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_allowed_content_types() -> Vec<String> {
    [
        "application/pdf",
        "text/plain",
        "text/markdown",
        "text/html",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.oasis.opendocument.text",
        "application/rtf",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_success_dismiss_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for KbmConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            upload: UploadConfig::default(),
            notifications: NotificationConfig::default(),
            library: LibraryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
            allowed_extensions: default_allowed_extensions(),
            allowed_content_types: default_allowed_content_types(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            success_dismiss_secs: default_success_dismiss_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl KbmConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: KbmConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration
    ///
    /// `cli_path` is the `--config` argument. When it is given the file must
    /// exist; otherwise a missing file falls back to defaults. Environment
    /// overrides are applied on top and the result is validated.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match cli_path {
            Some(path) => {
                info!("Loading config from {}", path.display());
                Self::from_file(path)?
            }
            None => match resolve_config_path() {
                Some(path) => {
                    info!("Loading config from {}", path.display());
                    Self::from_file(&path)?
                }
                None => {
                    warn!("No config file found, using compiled defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `KBM_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(ENV_SERVER_URL) {
            debug!("server_url overridden by {}", ENV_SERVER_URL);
            self.server_url = url;
        }

        if let Ok(raw) = std::env::var(ENV_PAGE_SIZE) {
            self.page_size = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a positive integer, got {:?}", ENV_PAGE_SIZE, raw))
            })?;
            debug!("page_size overridden by {}", ENV_PAGE_SIZE);
        }

        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            debug!("logging.level overridden by {}", ENV_LOG_LEVEL);
            self.logging.level = level;
        }

        Ok(())
    }

    /// Reject values the rest of the system cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(Error::Config("server_url must not be empty".to_string()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.upload.max_file_size_bytes == 0 {
            return Err(Error::Config(
                "upload.max_file_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.notifications.success_dismiss_secs == 0 {
            return Err(Error::Config(
                "notifications.success_dismiss_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Locate the config file from `KBM_CONFIG` or the platform config directory
///
/// Returns `None` when neither points at an existing file.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!("{} points at missing file {}", ENV_CONFIG, path.display());
    }

    default_config_path().filter(|p| p.exists())
}

/// `<config_dir>/kbm/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kbm").join("config.toml"))
}
