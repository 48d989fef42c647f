//! Configuration loading and working-directory resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Update scheduling period for the scan engine's [`ScanSettings`](crate::db::models::ScanSettings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPeriod {
    Never,
    Daily,
    Weekly,
    Monthly,
}

/// Type of a watched [`MediaRoot`](crate::db::models::MediaRoot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaRootType {
    Audio,
    Video,
}

/// Top-level server configuration, loaded from a TOML file and overridable
/// by environment variables and command-line flags (see [`resolve_working_dir`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for the database file and the similarity cache directory.
    pub working_dir: PathBuf,
    /// Bind address for the HTTP server (e.g. "0.0.0.0:4533").
    pub bind_addr: String,
    /// Path to the external transcoder binary (ffmpeg-class).
    pub ffmpeg_file: PathBuf,
    /// Maximum number of entries held in the cover LRU cache.
    pub cover_max_cache_size: usize,
    /// Maximum source file size considered as a sibling cover candidate.
    pub cover_max_file_size: u64,
    /// JPEG quality used when re-encoding covers, 1-100.
    pub cover_jpeg_quality: u8,
    /// Maximum number of login-throttler entries tracked by the (external)
    /// auth layer; carried here because it is provisioned at startup.
    pub login_throttler_max_entries: usize,
    /// Enables the Subsonic-compatible endpoints.
    pub api_subsonic: bool,
    /// Maximum number of concurrent transcodes.
    pub max_concurrent_transcodes: usize,
    /// Default / maximum page size for catalog list endpoints.
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Name of the directory-exclusion marker file.
    pub scan_exclusion_marker: String,
    /// Base URL of the external low-level feature service, if configured.
    /// Tracks missing a feature vector are skipped when absent.
    pub feature_service_url: Option<String>,
    /// TLS material for the external HTTP server shell, if any.
    pub tls_cert_file: Option<PathBuf>,
    pub tls_key_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            bind_addr: "0.0.0.0:4533".to_string(),
            ffmpeg_file: PathBuf::from("ffmpeg"),
            cover_max_cache_size: 1000,
            cover_max_file_size: 10 * 1024 * 1024,
            cover_jpeg_quality: 75,
            login_throttler_max_entries: 10_000,
            api_subsonic: true,
            max_concurrent_transcodes: 16,
            default_page_size: 50,
            max_page_size: 500,
            scan_exclusion_marker: ".nomedia".to_string(),
            feature_service_url: None,
            tls_cert_file: None,
            tls_key_file: None,
        }
    }
}

impl Config {
    /// Load configuration, applying the same priority order as
    /// [`resolve_working_dir`]: values in `config_path` take precedence
    /// over the struct's defaults, and `working_dir_override` (CLI/env)
    /// always wins.
    pub fn load(config_path: Option<&Path>, working_dir_override: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?
            }
            None => Config::default(),
        };

        if let Some(dir) = working_dir_override {
            config.working_dir = dir;
        }

        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.working_dir.join("wkmp.db")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.working_dir.join("cache")
    }
}

/// Resolve the working directory from, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `WKMP_WORKING_DIR`
/// 3. TOML config file's `working_dir` key
/// 4. OS-dependent compiled default (lowest priority)
pub fn resolve_working_dir(cli_arg: Option<&str>, config_file_value: Option<&str>) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("WKMP_WORKING_DIR") {
        return PathBuf::from(path);
    }

    if let Some(path) = config_file_value {
        return PathBuf::from(path);
    }

    default_working_dir()
}

/// Get the OS-dependent default working directory.
fn default_working_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("wkmp"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/wkmp"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("wkmp"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/wkmp"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("wkmp"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\wkmp"))
    } else {
        PathBuf::from("./wkmp_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_arg_wins_over_everything() {
        let dir = resolve_working_dir(Some("/cli/path"), Some("/config/path"));
        assert_eq!(dir, PathBuf::from("/cli/path"));
    }

    #[test]
    fn config_file_wins_over_default() {
        let dir = resolve_working_dir(None, Some("/config/path"));
        assert_eq!(dir, PathBuf::from("/config/path"));
    }
}
