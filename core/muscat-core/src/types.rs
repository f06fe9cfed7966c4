//! Core types shared by the graph, layout and session modules.
//!
//! Field names serialize in snake_case so documents and CLI output match the
//! git command layer.

use serde::{Deserialize, Serialize};

use crate::identity::identify;

// ═══════════════════════════════════════════════════════════════════════════════
// Worktree Types
// ═══════════════════════════════════════════════════════════════════════════════

/// One worktree as reported by the VCS. Produced fresh by every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeRecord {
    /// Absolute filesystem path, unique per worktree.
    pub path: String,
    /// Commit hash checked out in this worktree.
    pub head: String,
    /// `None` for a detached HEAD.
    pub branch: Option<String>,
    pub is_bare: bool,
    pub is_detached: bool,
    pub is_main: bool,
}

impl WorktreeRecord {
    /// A non-bare, attached worktree on `branch`.
    pub fn new(path: impl Into<String>, branch: Option<&str>, is_main: bool) -> Self {
        Self {
            path: path.into(),
            head: String::new(),
            branch: branch.map(str::to_string),
            is_bare: false,
            is_detached: branch.is_none(),
            is_main,
        }
    }
}

/// A reconciled worktree: stable identity plus a parent link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeNode {
    pub id: String,
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub record: WorktreeRecord,
}

impl WorktreeNode {
    /// Wraps a record with its derived id and no parent yet.
    pub fn unlinked(record: WorktreeRecord) -> Self {
        Self {
            id: identify(&record.path),
            parent_id: None,
            record,
        }
    }

    pub fn path(&self) -> &str {
        &self.record.path
    }

    pub fn branch(&self) -> Option<&str> {
        self.record.branch.as_deref()
    }

    pub fn is_main(&self) -> bool {
        self.record.is_main
    }

    /// Branch name, or `(detached)` when HEAD is detached.
    pub fn display_branch(&self) -> &str {
        self.branch().unwrap_or("(detached)")
    }

    /// Abbreviated commit hash for display.
    pub fn short_head(&self) -> &str {
        let end = self
            .record
            .head
            .char_indices()
            .nth(7)
            .map_or(self.record.head.len(), |(i, _)| i);
        &self.record.head[..end]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Layout Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Canvas coordinates of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

impl NodePosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A parent → child link, as handed to the layout engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}
