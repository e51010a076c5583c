//! Optional TOML configuration file.
//!
//! The file is read only when `--config <path>` is given.  Every key is
//! optional; a key that is absent falls through to the CLI default.  Example:
//!
//! ```toml
//! bind = "127.0.0.1"
//! port = 8080
//! chat_path = "/chat"
//! live_feed_path = "/live-feed"
//! feed_interval_ms = 1000
//! write_timeout_ms = 5000
//! read_buffer = 4096
//! echo_to_sender = false
//! ```
//!
//! Unknown keys are rejected so that a typo does not silently fall back to a
//! default.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Contents of a feedhub config file.  `None` means "not set in the file".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub bind: Option<IpAddr>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub chat_path: Option<String>,
    #[serde(default)]
    pub live_feed_path: Option<String>,
    #[serde(default)]
    pub feed_interval_ms: Option<u64>,
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
    #[serde(default)]
    pub handshake_timeout_ms: Option<u64>,
    #[serde(default)]
    pub read_buffer: Option<usize>,
    #[serde(default)]
    pub echo_to_sender: Option<bool>,
    #[serde(default)]
    pub shutdown_grace_ms: Option<u64>,
}

/// Reads and parses the config file at `path`.
///
/// Unlike an implicit platform config, an explicitly named file that does
/// not exist is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed or has unknown keys.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: FileConfig = toml::from_str(&content)?;
    Ok(cfg)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
