//! Remote targets (ssh accounts) and their lookup
//!
//! Accounts live in `<config_dir>/codelite-remote/accounts.toml`:
//!
//! ```toml
//! [[account]]
//! name = "build-box"
//! host = "10.0.0.12"
//! user = "eran"
//! port = 22
//! key_files = ["~/.ssh/id_build"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Where the remote process runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub key_files: Vec<PathBuf>,
}

fn default_port() -> u16 {
    22
}

impl Target {
    /// `user@host` as passed to ssh
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// First configured identity file, if any
    pub fn identity_file(&self) -> Option<&Path> {
        self.key_files.first().map(PathBuf::as_path)
    }
}

/// Resolves an account name into a [`Target`]
pub trait TargetResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Target>;
}

#[derive(Debug, Default, Deserialize)]
struct AccountsFile {
    #[serde(default, rename = "account")]
    accounts: Vec<Target>,
}

/// TOML-backed account registry
#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    accounts: Vec<Target>,
}

impl AccountStore {
    pub fn new(accounts: Vec<Target>) -> Self {
        Self { accounts }
    }

    /// Load accounts from the default location; a missing file yields an empty store
    pub fn load() -> Result<Self> {
        let path = crate::config::get_config_dir().join("accounts.toml");
        if !path.exists() {
            tracing::warn!("Accounts file not found at {:?}", path);
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Other(format!("Failed to read accounts {:?}: {}", path, e)))?;
        let file: AccountsFile = toml::from_str(&content)?;

        tracing::debug!("Loaded {} accounts from {:?}", file.accounts.len(), path);

        Ok(Self {
            accounts: file.accounts,
        })
    }

    pub fn accounts(&self) -> &[Target] {
        &self.accounts
    }
}

impl TargetResolver for AccountStore {
    fn resolve(&self, name: &str) -> Result<Target> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| Error::TargetResolution(format!("no account named '{}'", name)))
    }
}
