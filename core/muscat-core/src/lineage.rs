//! Branch lineage: which branch each worktree branch was forked from.
//!
//! Git does not track this, so it lives in a flat `branch → parent` document
//! that is loaded once and rewritten in full after every mutation. Storage
//! failures leave the in-memory map authoritative for the rest of the process.
//!
//! Entries are not checked for cycles here; the reconciler is responsible for
//! never turning a bad map into a bad graph.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::storage::{load_document, save_document, MemoryKeyValueStore, SharedStore, LINEAGE_KEY};

pub struct LineageStore {
    parents: BTreeMap<String, String>,
    backend: SharedStore,
}

impl LineageStore {
    /// Loads the lineage document from `backend` (empty if absent or unreadable).
    pub fn load(backend: SharedStore) -> Self {
        let parents: BTreeMap<String, String> = load_document(backend.as_ref(), LINEAGE_KEY);
        tracing::debug!(entries = parents.len(), "Loaded lineage");
        Self { parents, backend }
    }

    pub fn new_in_memory() -> Self {
        Self::load(Arc::new(MemoryKeyValueStore::new()))
    }

    /// Sets the parent of `branch`, replacing any previous one.
    pub fn record_parent(&mut self, branch: &str, parent_branch: &str) {
        self.parents
            .insert(branch.to_string(), parent_branch.to_string());
        self.persist();
    }

    /// Forgets the parent of `branch`. No-op if none was recorded.
    pub fn remove_parent(&mut self, branch: &str) {
        if self.parents.remove(branch).is_some() {
            self.persist();
        }
    }

    pub fn lookup_parent(&self, branch: &str) -> Option<&str> {
        self.parents.get(branch).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.parents
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    fn persist(&self) {
        save_document(self.backend.as_ref(), LINEAGE_KEY, &self.parents);
    }
}
