//! Storage configuration and the key-value backend behind every persisted document.
//!
//! This module provides:
//!
//! - `StorageConfig`: centralised path management (default `~/.muscat/`)
//! - `KeyValueStore`: the backend interface the stores are written against
//! - `FileKeyValueStore` / `MemoryKeyValueStore`: production and test backends
//! - `load_document` / `save_document`: best-effort JSON persistence
//!
//! ## Design Principles
//!
//! - **Single source of truth**: All path decisions centralized here
//! - **Testable**: `StorageConfig::with_root()` and `MemoryKeyValueStore` enable test injection
//! - **Graceful degradation**: Document helpers never return errors; failures
//!   are logged and treated as "no persisted data"

use crate::error::{MuscatError, Result};
use fs_err as fs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Key of the branch → parent branch document.
pub const LINEAGE_KEY: &str = "lineage";
/// Key of the node id → position document.
pub const POSITIONS_KEY: &str = "node-positions";
/// Key of the auto/manual layout mode document.
pub const LAYOUT_MODE_KEY: &str = "layout";
/// Key of the opened-projects document.
pub const PROJECTS_KEY: &str = "projects";
/// Key of the engine configuration document.
pub const CONFIG_KEY: &str = "config";

/// Central configuration for all Muscat storage paths.
///
/// Production code uses `StorageConfig::default()` which points to `~/.muscat/`.
/// Tests use `StorageConfig::with_root(temp_dir)` for isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: home.join(".muscat"),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the root directory for Muscat data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the JSON document stored under `key`.
    pub fn document_file(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    /// Path to lineage.json (branch → parent branch).
    pub fn lineage_file(&self) -> PathBuf {
        self.document_file(LINEAGE_KEY)
    }

    /// Path to node-positions.json (manual node coordinates).
    pub fn positions_file(&self) -> PathBuf {
        self.document_file(POSITIONS_KEY)
    }

    /// Path to projects.json (opened repositories).
    pub fn projects_file(&self) -> PathBuf {
        self.document_file(PROJECTS_KEY)
    }

    /// Path to config.json (engine preferences).
    pub fn config_file(&self) -> PathBuf {
        self.document_file(CONFIG_KEY)
    }

    /// Path to logs/ directory.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Ensures the root directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Backends
// ═══════════════════════════════════════════════════════════════════════════════

/// Durable key-value storage, one logical document per key.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Backend shared by every store of one engine.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Stores each key as `<root>/<key>.json`.
///
/// Writes go through a temp file in the same directory and are renamed into
/// place, so a crash never leaves a half-written document.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    config: StorageConfig,
}

impl FileKeyValueStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.config.document_file(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| MuscatError::Io {
                context: format!("Failed to read {}", path.display()),
                source: e,
            })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.config.document_file(key);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| MuscatError::Io {
            context: "Failed to create storage directory".to_string(),
            source: e,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| MuscatError::Io {
            context: "Failed to create temp file".to_string(),
            source: e,
        })?;
        tmp.write_all(value.as_bytes()).map_err(|e| MuscatError::Io {
            context: "Failed to write temp file".to_string(),
            source: e,
        })?;
        tmp.flush().map_err(|e| MuscatError::Io {
            context: "Failed to flush temp file".to_string(),
            source: e,
        })?;
        tmp.persist(&path).map_err(|e| MuscatError::Io {
            context: format!("Failed to persist {}", path.display()),
            source: e.error,
        })?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.config.document_file(key);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(&path).map_err(|e| MuscatError::Io {
            context: format!("Failed to remove {}", path.display()),
            source: e,
        })
    }
}

/// In-memory backend for tests.
///
/// `set_failing(true)` makes every call fail, which simulates an unavailable
/// medium or an exceeded quota.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Raw document contents, bypassing the failure switch.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MuscatError::Io {
                context: format!("Storage unavailable for {key}"),
                source: std::io::Error::other("simulated storage failure"),
            });
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check(key)?;
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check(key)?;
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check(key)?;
        self.entries().remove(key);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Best-effort documents
// ═══════════════════════════════════════════════════════════════════════════════

/// Loads the document under `key`, or `T::default()` when it is missing,
/// unreadable or corrupt.
pub fn load_document<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let content = match store.get(key) {
        Ok(Some(content)) => content,
        Ok(None) => return T::default(),
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read document, using defaults");
            return T::default();
        }
    };

    if content.trim().is_empty() {
        return T::default();
    }

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "Corrupt document, using defaults");
            T::default()
        }
    }
}

/// Serializes `value` and writes it under `key`.
///
/// Returns whether the write landed. Failures are logged, never raised.
pub fn save_document<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool
where
    T: Serialize + ?Sized,
{
    let content = match serde_json::to_string_pretty(value) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to serialize document");
            return false;
        }
    };

    match store.set(key, &content) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to write document");
            false
        }
    }
}
