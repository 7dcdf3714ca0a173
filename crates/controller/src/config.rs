//! Controller configuration (spec "Configuration"): a local TOML file the
//! controller reads at startup plus the richer configuration it in turn
//! serves to connecting daemons.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    pub task_dir: PathBuf,
    pub store_path: PathBuf,
    pub ripped_dir: PathBuf,
    pub inbox_dir: PathBuf,
    #[serde(default = "default_preset_dir")]
    pub preset_dir: PathBuf,
    #[serde(default = "default_transcoder_tool_paths")]
    pub transcoder_tool_paths: Vec<PathBuf>,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_transcode_idle_timeout_secs")]
    pub transcode_idle_timeout_secs: u64,
}

fn default_listen_port() -> u16 {
    7777
}

fn default_preset_dir() -> PathBuf {
    PathBuf::from("/etc/amphigory/presets")
}

fn default_transcoder_tool_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/bin/HandBrakeCLI"),
        PathBuf::from("/usr/local/bin/HandBrakeCLI"),
    ]
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_transcode_idle_timeout_secs() -> u64 {
    600
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            task_dir: PathBuf::from("/var/lib/amphigory/tasks"),
            store_path: PathBuf::from("/var/lib/amphigory/metadata.sqlite3"),
            ripped_dir: PathBuf::from("/var/lib/amphigory/ripped"),
            inbox_dir: PathBuf::from("/var/lib/amphigory/inbox"),
            preset_dir: default_preset_dir(),
            transcoder_tool_paths: default_transcoder_tool_paths(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            log_level: default_log_level(),
            transcode_idle_timeout_secs: default_transcode_idle_timeout_secs(),
        }
    }
}

impl ControllerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The first configured transcoder tool path that exists on this
    /// filesystem, mirroring the daemon's disc-tool auto-discovery.
    pub fn discover_transcoder_tool(&self) -> Option<PathBuf> {
        self.transcoder_tool_paths.iter().find(|p| p.exists()).cloned()
    }
}
