//! Engine tunables, loaded from `config.json` under the storage root.
//!
//! Every field has a default, so a partial or missing file is fine. A corrupt
//! file yields the full defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::activity::{DEFAULT_IDLE_THRESHOLD, DEFAULT_POLL_INTERVAL};
use crate::sessions::DEFAULT_OUTPUT_BUFFER_CAP;
use crate::storage::{load_document, save_document, KeyValueStore, CONFIG_KEY};

/// Command started in a persistent pane.
pub const DEFAULT_PERSISTENT_COMMAND: &str = "claude";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub output_buffer_cap: usize,
    pub idle_threshold_ms: u64,
    pub poll_interval_ms: u64,
    pub persistent_command: String,
    pub workspaces_dir: PathBuf,
    /// Drop saved positions after this many consecutive fetches without the
    /// node. `None` keeps them forever.
    pub prune_positions_after_fetches: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_buffer_cap: DEFAULT_OUTPUT_BUFFER_CAP,
            idle_threshold_ms: DEFAULT_IDLE_THRESHOLD.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            persistent_command: DEFAULT_PERSISTENT_COMMAND.to_string(),
            workspaces_dir: default_workspaces_dir(),
            prune_positions_after_fetches: None,
        }
    }
}

impl EngineConfig {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        load_document(store, CONFIG_KEY)
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> bool {
        save_document(store, CONFIG_KEY, self)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `~/code-craft/workspaces`, or a relative path when there is no home.
pub fn default_workspaces_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("code-craft")
        .join("workspaces")
}
