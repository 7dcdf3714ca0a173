//! Daemon configuration (spec "Configuration"): a small local file plus a
//! richer configuration served by the controller and cached on disk.

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
    #[error("serializing cached config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The small file the daemon reads at startup: just enough to find the
/// controller and the shared task directory. Everything else is pulled
/// from the controller's richer config on first connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub controller_host: String,
    pub controller_port: u16,
    pub task_dir: PathBuf,
    #[serde(default = "default_daemon_id")]
    pub daemon_id: String,
}

fn default_daemon_id() -> String {
    "daemon-1".to_string()
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            controller_host: "127.0.0.1".to_string(),
            controller_port: 7777,
            task_dir: PathBuf::from("/var/lib/amphigory/tasks"),
            daemon_id: default_daemon_id(),
        }
    }
}

impl LocalConfig {
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
}

/// Pushed by the controller on connect and whenever it changes; cached on
/// the daemon's filesystem so a restart doesn't need a round-trip before
/// the scan/ripper drivers know their idle timeouts and tool hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub heartbeat_interval_secs: u64,
    pub log_level: String,
    pub disc_tool_paths: Vec<PathBuf>,
    pub rip_idle_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            log_level: "info".to_string(),
            disc_tool_paths: vec![
                PathBuf::from("/usr/bin/makemkvcon"),
                PathBuf::from("/usr/local/bin/makemkvcon"),
                PathBuf::from("/opt/makemkv/bin/makemkvcon"),
            ],
            rip_idle_timeout_secs: 120,
        }
    }
}

impl RemoteConfig {
    pub fn load_cached(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save_cached(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The first configured tool path that exists on this filesystem, if
    /// any — the daemon's auto-discovery list.
    pub fn discover_disc_tool(&self) -> Option<PathBuf> {
        self.disc_tool_paths.iter().find(|p| p.exists()).cloned()
    }
}
