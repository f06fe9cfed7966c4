//! Current worktree graph of the open repository.
//!
//! Fetches are split into [`WorktreeGraph::begin_fetch`] and one of the
//! `complete_*` calls so a host can run the listing elsewhere. Every
//! `begin_fetch` supersedes the ones before it: a completion carrying an
//! older [`FetchTicket`] is dropped, so the last initiated fetch always wins.

use crate::error::MuscatError;
use crate::lineage::LineageStore;
use crate::reconcile::reconcile;
use crate::types::{WorktreeNode, WorktreeRecord};

/// Proof that a fetch was started. Only the newest ticket may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

#[derive(Default)]
pub struct WorktreeGraph {
    records: Vec<WorktreeRecord>,
    nodes: Vec<WorktreeNode>,
    main_repo_path: Option<String>,
    loading: bool,
    last_error: Option<String>,
    generation: u64,
}

impl WorktreeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.generation += 1;
        self.loading = true;
        FetchTicket(self.generation)
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.0 == self.generation
    }

    /// Applies a successful listing. Returns false if `ticket` was superseded.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        main_repo_path: &str,
        records: Vec<WorktreeRecord>,
        lineage: &LineageStore,
    ) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(ticket = ticket.0, current = self.generation, "Dropping stale fetch");
            return false;
        }
        self.nodes = reconcile(&records, lineage);
        self.records = records;
        self.main_repo_path = Some(main_repo_path.to_string());
        self.loading = false;
        self.last_error = None;
        true
    }

    /// Records a failed listing. Nodes keep their last good value.
    pub fn fail_fetch(&mut self, ticket: FetchTicket, error: &MuscatError) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.loading = false;
        self.last_error = Some(error.to_string());
        true
    }

    /// Re-runs reconciliation over the last fetched records, after a lineage
    /// edit that did not go through a fetch.
    pub fn relink(&mut self, lineage: &LineageStore) {
        self.nodes = reconcile(&self.records, lineage);
    }

    pub fn record_error(&mut self, error: &MuscatError) {
        self.last_error = Some(error.to_string());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn nodes(&self) -> &[WorktreeNode] {
        &self.nodes
    }

    pub fn main_node(&self) -> Option<&WorktreeNode> {
        self.nodes.iter().find(|n| n.is_main())
    }

    pub fn find_by_id(&self, id: &str) -> Option<&WorktreeNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&WorktreeNode> {
        let wanted = path.trim_end_matches('/');
        self.nodes
            .iter()
            .find(|n| n.path().trim_end_matches('/') == wanted)
    }

    pub fn main_repo_path(&self) -> Option<&str> {
        self.main_repo_path.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<WorktreeRecord> {
        vec![
            WorktreeRecord::new("/r", Some("main"), true),
            WorktreeRecord::new("/r-f", Some("feat"), false),
        ]
    }

    #[test]
    fn test_fetch_applies_and_clears_loading() {
        let lineage = LineageStore::new_in_memory();
        let mut graph = WorktreeGraph::new();

        let ticket = graph.begin_fetch();
        assert!(graph.is_loading());
        assert!(graph.complete_fetch(ticket, "/r", records(), &lineage));

        assert!(!graph.is_loading());
        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(graph.main_repo_path(), Some("/r"));
        assert_eq!(graph.main_node().map(|n| n.path()), Some("/r"));
    }

    #[test]
    fn test_last_initiated_fetch_wins() {
        let lineage = LineageStore::new_in_memory();
        let mut graph = WorktreeGraph::new();

        let first = graph.begin_fetch();
        let second = graph.begin_fetch();
        assert!(graph.complete_fetch(second, "/r", records(), &lineage));

        // The older completion arrives late and must not overwrite.
        assert!(!graph.complete_fetch(
            first,
            "/old",
            vec![WorktreeRecord::new("/old", Some("main"), true)],
            &lineage
        ));
        assert_eq!(graph.main_repo_path(), Some("/r"));
        assert_eq!(graph.nodes().len(), 2);
    }

    #[test]
    fn test_failed_fetch_keeps_last_good_nodes() {
        let lineage = LineageStore::new_in_memory();
        let mut graph = WorktreeGraph::new();
        let ticket = graph.begin_fetch();
        graph.complete_fetch(ticket, "/r", records(), &lineage);

        let ticket = graph.begin_fetch();
        let error = MuscatError::CommandFailed {
            command: "git worktree list".to_string(),
            details: "fatal: not a git repository".to_string(),
        };
        assert!(graph.fail_fetch(ticket, &error));

        assert_eq!(graph.nodes().len(), 2);
        assert!(!graph.is_loading());
        assert!(graph.last_error().is_some_and(|e| e.contains("not a git repository")));
    }

    #[test]
    fn test_stale_failure_is_ignored() {
        let mut graph = WorktreeGraph::new();
        let stale = graph.begin_fetch();
        let _current = graph.begin_fetch();

        assert!(!graph.fail_fetch(stale, &MuscatError::NoRepository));
        assert!(graph.is_loading());
        assert!(graph.last_error().is_none());
    }

    #[test]
    fn test_relink_uses_cached_records() {
        let mut lineage = LineageStore::new_in_memory();
        let mut graph = WorktreeGraph::new();
        let ticket = graph.begin_fetch();
        graph.complete_fetch(
            ticket,
            "/r",
            vec![
                WorktreeRecord::new("/r", Some("main"), true),
                WorktreeRecord::new("/r-a", Some("a"), false),
                WorktreeRecord::new("/r-b", Some("b"), false),
            ],
            &lineage,
        );
        let a_id = graph.find_by_path("/r-a").map(|n| n.id.clone());

        lineage.record_parent("b", "a");
        graph.relink(&lineage);

        assert_eq!(graph.find_by_path("/r-b").and_then(|n| n.parent_id.clone()), a_id);
    }

    #[test]
    fn test_find_by_path_ignores_trailing_slash() {
        let lineage = LineageStore::new_in_memory();
        let mut graph = WorktreeGraph::new();
        let ticket = graph.begin_fetch();
        graph.complete_fetch(ticket, "/r", records(), &lineage);

        assert!(graph.find_by_path("/r-f/").is_some());
        assert!(graph.find_by_path("/nowhere").is_none());
    }
}
