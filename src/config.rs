//! Client configuration
//!
//! Parses `<config_dir>/codelite-remote/config.toml`. Every field has a
//! default, so a missing file or a partial file is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Settings that shape how the remote process is launched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    /// ssh client program, looked up in PATH
    pub ssh_program: String,

    /// scp client program used to stage the remote script
    pub scp_program: String,

    /// Seconds between ssh keep-alive probes (`ServerAliveInterval`)
    pub server_alive_interval: u32,

    /// Enforce host key verification (`StrictHostKeyChecking`)
    pub strict_host_key_checking: bool,

    /// Interpreter used to run the remote script
    pub interpreter: String,

    /// Local copy of the remote script, uploaded on start
    pub local_script: Option<PathBuf>,

    /// Upload `local_script` before starting the session
    pub upload: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
            server_alive_interval: 10,
            strict_host_key_checking: false,
            interpreter: "python3".to_string(),
            local_script: None,
            upload: true,
        }
    }
}

/// Directory holding `config.toml` and `accounts.toml`
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codelite-remote")
}

/// Read configuration from the default location
pub fn read_config() -> Result<RemoteConfig> {
    let config_path = get_config_dir().join("config.toml");

    if !config_path.exists() {
        tracing::debug!("No config at {:?}, using defaults", config_path);
        return Ok(RemoteConfig::default());
    }

    read_config_from_path(&config_path)
}

/// Read configuration from a specific path
pub fn read_config_from_path(path: &Path) -> Result<RemoteConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Other(format!("Failed to read config {:?}: {}", path, e)))?;

    let config: RemoteConfig = toml::from_str(&content)?;

    tracing::debug!("Loaded config from {:?}", path);

    Ok(config)
}
