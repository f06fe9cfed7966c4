//! Node placement: manual positions, the auto/manual mode switch, and the
//! seam to the external layout engine.
//!
//! Positions are keyed by node id and only change on an explicit drag end.
//! They are consulted only while auto layout is off. Entries for nodes that
//! no longer exist are harmless; [`LayoutStore::note_fetch`] can prune them
//! after a configurable number of fetches without the id.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{
    load_document, save_document, MemoryKeyValueStore, SharedStore, LAYOUT_MODE_KEY,
    POSITIONS_KEY,
};
use crate::types::{GraphEdge, NodePosition, WorktreeNode};

/// Height of a rendered node, used by the fallback layout.
pub const NODE_HEIGHT: f64 = 140.0;
/// Vertical gap between stacked nodes in the fallback layout.
pub const NODE_SPACING: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct LayoutMode {
    #[serde(default = "default_auto_layout")]
    auto_layout: bool,
}

fn default_auto_layout() -> bool {
    true
}

impl Default for LayoutMode {
    fn default() -> Self {
        Self { auto_layout: true }
    }
}

pub struct LayoutStore {
    positions: BTreeMap<String, NodePosition>,
    mode: LayoutMode,
    missed_fetches: HashMap<String, u32>,
    backend: SharedStore,
}

impl LayoutStore {
    /// Creates a store bound to `backend` and loads what it holds.
    pub fn load_from(backend: SharedStore) -> Self {
        let mut store = Self {
            positions: BTreeMap::new(),
            mode: LayoutMode::default(),
            missed_fetches: HashMap::new(),
            backend,
        };
        store.load();
        store
    }

    pub fn new_in_memory() -> Self {
        Self::load_from(Arc::new(MemoryKeyValueStore::new()))
    }

    /// Records a manual position. Call [`persist`](Self::persist) to save it.
    pub fn set_position(&mut self, id: &str, position: NodePosition) {
        self.positions.insert(id.to_string(), position);
        self.missed_fetches.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<NodePosition> {
        self.positions.get(id).copied()
    }

    pub fn get_all(&self) -> &BTreeMap<String, NodePosition> {
        &self.positions
    }

    /// Writes the current positions snapshot. Failures are logged and ignored.
    pub fn persist(&self) {
        save_document(self.backend.as_ref(), POSITIONS_KEY, &self.positions);
    }

    /// Replaces in-memory positions and mode with the persisted ones.
    ///
    /// Missing or unreadable documents leave the defaults (no positions,
    /// auto layout on).
    pub fn load(&mut self) {
        self.positions = load_document(self.backend.as_ref(), POSITIONS_KEY);
        self.mode = load_document(self.backend.as_ref(), LAYOUT_MODE_KEY);
        self.missed_fetches.clear();
    }

    pub fn auto_layout(&self) -> bool {
        self.mode.auto_layout
    }

    pub fn set_auto_layout(&mut self, enabled: bool) {
        self.mode.auto_layout = enabled;
        save_document(self.backend.as_ref(), LAYOUT_MODE_KEY, &self.mode);
    }

    /// Flips the layout mode and returns the new value.
    pub fn toggle_auto_layout(&mut self) -> bool {
        self.set_auto_layout(!self.mode.auto_layout);
        self.mode.auto_layout
    }

    /// Tracks which stored ids appeared in the latest fetch.
    ///
    /// With `prune_after = Some(n)`, positions whose id has been absent from
    /// `n` consecutive fetches are dropped and the snapshot is persisted.
    /// Returns the number of pruned entries.
    pub fn note_fetch<'a, I>(&mut self, present_ids: I, prune_after: Option<u32>) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let Some(limit) = prune_after else {
            return 0;
        };

        let present: std::collections::HashSet<&str> = present_ids.into_iter().collect();
        let mut stale = Vec::new();
        for id in self.positions.keys() {
            if present.contains(id.as_str()) {
                self.missed_fetches.remove(id);
                continue;
            }
            let missed = self.missed_fetches.entry(id.clone()).or_insert(0);
            *missed += 1;
            if *missed >= limit {
                stale.push(id.clone());
            }
        }

        for id in &stale {
            self.positions.remove(id);
            self.missed_fetches.remove(id);
        }
        if !stale.is_empty() {
            tracing::debug!(pruned = stale.len(), "Pruned stale node positions");
            self.persist();
        }
        stale.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Layout engine seam
// ═══════════════════════════════════════════════════════════════════════════════

/// External layout algorithm: node set + edges → positions.
pub trait LayoutEngine {
    fn layout(
        &self,
        nodes: &[WorktreeNode],
        edges: &[GraphEdge],
    ) -> Result<HashMap<String, NodePosition>>;
}

/// Stacks nodes vertically in input order.
#[derive(Debug, Default, Clone, Copy)]
pub struct StackedLayout;

impl LayoutEngine for StackedLayout {
    fn layout(
        &self,
        nodes: &[WorktreeNode],
        _edges: &[GraphEdge],
    ) -> Result<HashMap<String, NodePosition>> {
        Ok(fallback_positions(nodes))
    }
}

/// A node with its final canvas position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedNode {
    pub id: String,
    pub position: NodePosition,
}

/// One edge per linked node, id `<parent>-<child>`.
pub fn graph_edges(nodes: &[WorktreeNode]) -> Vec<GraphEdge> {
    nodes
        .iter()
        .filter_map(|node| {
            let parent = node.parent_id.as_ref()?;
            Some(GraphEdge {
                id: format!("{}-{}", parent, node.id),
                source: parent.clone(),
                target: node.id.clone(),
            })
        })
        .collect()
}

/// Vertical stack used when the layout engine fails.
pub fn fallback_positions(nodes: &[WorktreeNode]) -> HashMap<String, NodePosition> {
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let y = index as f64 * (NODE_HEIGHT + NODE_SPACING);
            (node.id.clone(), NodePosition::new(0.0, y))
        })
        .collect()
}

/// Runs `engine` and applies the layout mode.
///
/// Auto mode uses the engine's positions as-is. Manual mode prefers a saved
/// position and falls back to the engine's for nodes never dragged. An engine
/// failure degrades to [`fallback_positions`].
pub fn place_nodes(
    engine: &dyn LayoutEngine,
    nodes: &[WorktreeNode],
    store: &LayoutStore,
) -> Vec<PlacedNode> {
    let edges = graph_edges(nodes);
    let computed = engine.layout(nodes, &edges).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Layout engine failed, using stacked fallback");
        fallback_positions(nodes)
    });

    nodes
        .iter()
        .map(|node| {
            let computed = computed.get(&node.id).copied().unwrap_or_default();
            let position = if store.auto_layout() {
                computed
            } else {
                store.get(&node.id).unwrap_or(computed)
            };
            PlacedNode {
                id: node.id.clone(),
                position,
            }
        })
        .collect()
}
