//! Store configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for one filesystem instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on nodes held in the in-memory path trie. Entries are
    /// caches of persistent data, so a smaller bound only costs lookups.
    pub max_cached_nodes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_cached_nodes: 4096,
        }
    }
}

impl StoreConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(StoreConfig::default().max_cached_nodes, 4096);
    }

    #[test]
    fn test_load_partial_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");

        std::fs::write(&path, "max_cached_nodes = 16\n")?;
        assert_eq!(StoreConfig::load(&path)?.max_cached_nodes, 16);

        std::fs::write(&path, "")?;
        assert_eq!(
            StoreConfig::load(&path)?.max_cached_nodes,
            StoreConfig::default().max_cached_nodes
        );

        Ok(())
    }
}
