use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "pagecraft.store.json";

/// Store configuration file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// JSON snapshot written after every committed transaction.
    /// In-memory only when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,

    /// Indent snapshot JSON
    #[serde(default)]
    pub pretty_snapshot: bool,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: Some(path.into()),
            pretty_snapshot: false,
        }
    }

    /// Load config from a directory, falling back to defaults.
    /// A relative snapshot path is resolved against that directory.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let mut config: StoreConfig = serde_json::from_str(&content)?;
            if let Some(path) = &config.snapshot_path {
                if path.is_relative() {
                    config.snapshot_path = Some(dir.join(path));
                }
            }
            Ok(config)
        } else {
            Ok(StoreConfig::default())
        }
    }
}
