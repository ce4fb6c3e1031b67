use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "pagecraft.editor.json";

/// Editor configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Stamp the owning page's `updatedAt` whenever a mutation names one,
    /// even when the page record itself is not a changed parent
    #[serde(default = "default_touch_owning_page")]
    pub touch_owning_page: bool,

    /// Suffix appended to the slug of a duplicated page
    #[serde(default = "default_slug_suffix")]
    pub slug_suffix: String,
}

fn default_touch_owning_page() -> bool {
    true
}

fn default_slug_suffix() -> String {
    "copy".to_string()
}

impl EditorConfig {
    /// Load config from a directory
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: EditorConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(EditorConfig::default())
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            touch_owning_page: default_touch_owning_page(),
            slug_suffix: default_slug_suffix(),
        }
    }
}
