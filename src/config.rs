//! Configuration for the send plugin.
//!
//! Configuration loading and persistence live outside this plugin's scope;
//! what's here is the minimal loader that hands the contract and protocol
//! engine the two values the host promises (`chainID`, `dataDir`) plus the
//! timing knobs the protocol engine needs, with sensible defaults when a
//! config file doesn't set them.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI arguments for the send plugin process.
#[derive(Parser, Debug)]
#[command(name = "send-plugin")]
#[command(about = "Canopy FSM plugin implementing the send contract")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "plugin_config.json")]
    config: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain_id: u64,
    pub data_dir: PathBuf,
    #[serde(default = "defaults::connection_timeout_ms")]
    pub(crate) connection_timeout_ms: u64,
    #[serde(default = "defaults::request_timeout_ms")]
    pub(crate) request_timeout_ms: u64,
    #[serde(default = "defaults::reconnect_interval_ms")]
    pub(crate) reconnect_interval_ms: u64,
}

mod defaults {
    pub fn connection_timeout_ms() -> u64 {
        5_000
    }
    pub fn request_timeout_ms() -> u64 {
        10_000
    }
    pub fn reconnect_interval_ms() -> u64 {
        3_000
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::from_file(&args.config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: Config =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        Ok(config)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.data_dir.join("plugin.sock")
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_timing_fields() {
        let config: Config =
            serde_json::from_str(r#"{"chain_id": 1, "data_dir": "/tmp/plugin"}"#).unwrap();
        assert_eq!(config.chain_id, 1);
        assert_eq!(config.connection_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.request_timeout(), Duration::from_millis(10_000));
        assert_eq!(config.reconnect_interval(), Duration::from_millis(3_000));
    }

    #[test]
    fn socket_path_is_data_dir_plus_plugin_sock() {
        let config: Config =
            serde_json::from_str(r#"{"chain_id": 1, "data_dir": "/var/canopy"}"#).unwrap();
        assert_eq!(config.socket_path(), PathBuf::from("/var/canopy/plugin.sock"));
    }

    #[test]
    fn explicit_timing_fields_override_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"chain_id": 1, "data_dir": "/tmp", "request_timeout_ms": 500}"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout(), Duration::from_millis(500));
    }
}
