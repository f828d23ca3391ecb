//! Engine configuration, read from TOML
//!
//! ```toml
//! [store]
//! path = "/var/lib/contract-admin/db"
//! temporary = false
//! flush_on_write = true
//!
//! [authorization]
//! scope_to_assigned_engineer = true
//! ```
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub authorization: AuthorizationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Deleted when the store is dropped. Opt-in, for tests and demos.
    pub temporary: bool,
    pub flush_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("contract-admin.db"),
            temporary: false,
            flush_on_write: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorizationConfig {
    /// Restrict engineer-only actions to the engineer assigned on the contract.
    pub scope_to_assigned_engineer: bool,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("invalid engine configuration")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&raw)
    }
}
