//! Walk configuration
//!
//! Every field has a default, so a config file only needs to name the
//! knobs it changes:
//!
//! ```toml
//! [tree]
//! prefetch_window = 16
//! max_concurrent_loads = 64
//!
//! [fs]
//! channel_capacity = 256
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options for the snapshot tree walker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeWalkOptions {
    /// Path of the root job; children are joined onto it (default: empty)
    #[serde(default)]
    pub prefix: PathBuf,

    /// Subtrees prefetched ahead of the emission point, per directory (default: 8)
    #[serde(default = "default_prefetch_window")]
    pub prefetch_window: usize,

    /// Tree loads in flight across the whole walk (default: 32)
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,

    /// Subtree tasks that may run ahead of the emission point across the
    /// whole walk (default: 256)
    #[serde(default = "default_max_prefetched_subtrees")]
    pub max_prefetched_subtrees: usize,

    /// Jobs a prefetched subtree may buffer before it waits (default: 64)
    #[serde(default = "default_buffer")]
    pub subtree_buffer: usize,

    /// Capacity of the output job channel (default: 64)
    #[serde(default = "default_buffer")]
    pub channel_capacity: usize,
}

impl Default for TreeWalkOptions {
    fn default() -> Self {
        Self {
            prefix: PathBuf::new(),
            prefetch_window: default_prefetch_window(),
            max_concurrent_loads: default_max_concurrent_loads(),
            max_prefetched_subtrees: default_max_prefetched_subtrees(),
            subtree_buffer: default_buffer(),
            channel_capacity: default_buffer(),
        }
    }
}

impl TreeWalkOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least_one("tree.prefetch_window", self.prefetch_window)?;
        at_least_one("tree.max_concurrent_loads", self.max_concurrent_loads)?;
        at_least_one("tree.max_prefetched_subtrees", self.max_prefetched_subtrees)?;
        at_least_one("tree.subtree_buffer", self.subtree_buffer)?;
        at_least_one("tree.channel_capacity", self.channel_capacity)
    }
}

/// Options for the filesystem walker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsWalkOptions {
    /// Capacity of the output job channel (default: 64)
    #[serde(default = "default_buffer")]
    pub channel_capacity: usize,
}

impl Default for FsWalkOptions {
    fn default() -> Self {
        Self {
            channel_capacity: default_buffer(),
        }
    }
}

impl FsWalkOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least_one("fs.channel_capacity", self.channel_capacity)
    }
}

/// Combined configuration for both walkers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkConfig {
    #[serde(default)]
    pub tree: TreeWalkOptions,

    #[serde(default)]
    pub fs: FsWalkOptions,
}

impl WalkConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: WalkConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tree.validate()?;
        self.fs.validate()
    }
}

fn at_least_one(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value < 1 {
        return Err(ConfigError::TooSmall { field, value, min: 1 });
    }
    Ok(())
}

fn default_prefetch_window() -> usize {
    8
}

fn default_max_prefetched_subtrees() -> usize {
    256
}

fn default_max_concurrent_loads() -> usize {
    32
}

fn default_buffer() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = WalkConfig::from_toml_str("").unwrap();
        assert_eq!(config, WalkConfig::default());
        assert_eq!(config.tree.prefetch_window, 8);
        assert_eq!(config.tree.max_concurrent_loads, 32);
        assert_eq!(config.tree.max_prefetched_subtrees, 256);
        assert_eq!(config.fs.channel_capacity, 64);
        assert_eq!(config.tree.prefix, PathBuf::new());
    }

    #[test]
    fn test_partial_override() {
        let config = WalkConfig::from_toml_str(
            "[tree]\nprefetch_window = 2\nprefix = \"snap\"\n\n[fs]\nchannel_capacity = 1\n",
        )
        .unwrap();
        assert_eq!(config.tree.prefetch_window, 2);
        assert_eq!(config.tree.prefix, PathBuf::from("snap"));
        assert_eq!(config.tree.subtree_buffer, 64);
        assert_eq!(config.fs.channel_capacity, 1);
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = WalkConfig::from_toml_str("[tree]\nprefetch_window = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TooSmall {
                field: "tree.prefetch_window",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_prefetch_limit_rejected() {
        let options = TreeWalkOptions {
            max_prefetched_subtrees: 0,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConfigError::TooSmall {
                field: "tree.max_prefetched_subtrees",
                ..
            })
        ));
    }

    #[test]
    fn test_malformed_document_rejected() {
        assert!(matches!(
            WalkConfig::from_toml_str("[tree\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("walk.toml");
        std::fs::write(&path, "[tree]\nmax_concurrent_loads = 4\n")?;

        let config = WalkConfig::load(&path)?;
        assert_eq!(config.tree.max_concurrent_loads, 4);

        assert!(matches!(
            WalkConfig::load(&temp_dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
        Ok(())
    }
}
