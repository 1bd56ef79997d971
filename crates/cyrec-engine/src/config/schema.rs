use cyrec_common::protocol::default_selector_attributes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Seed values for the persisted selector lists, used while storage holds none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_selector_attributes")]
    pub preferred: Vec<String>,
    #[serde(default = "default_selector_attributes")]
    pub optional_attributes: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            preferred: default_selector_attributes(),
            optional_attributes: default_selector_attributes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Append a URL assertion on every same-site navigation.
    #[serde(default = "default_checkpoint_on_navigation")]
    pub checkpoint_on_navigation: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            checkpoint_on_navigation: default_checkpoint_on_navigation(),
        }
    }
}

fn default_checkpoint_on_navigation() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    9001
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    crate::storage::FileStore::default_path()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_suite_name")]
    pub suite_name: String,
    #[serde(default = "default_test_name")]
    pub test_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            suite_name: default_suite_name(),
            test_name: default_test_name(),
        }
    }
}

fn default_suite_name() -> String {
    "Recorded session".to_string()
}

fn default_test_name() -> String {
    "replays the recorded steps".to_string()
}
