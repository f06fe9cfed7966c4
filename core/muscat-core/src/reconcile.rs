//! Reconciliation: flat worktree list + lineage → linked node set.
//!
//! Every fetch produces fresh [`WorktreeRecord`]s. Reconciling assigns each a
//! path-derived id and a parent link:
//!
//! 1. The first record flagged `is_main` is the root; its parent is always `None`.
//! 2. A branch whose recorded parent branch is checked out in this fetch links
//!    to that worktree.
//! 3. Everything else (no lineage entry, parent not present, self-reference,
//!    ambiguous branch, detached HEAD) links to the root.
//! 4. Any cycle left in the resolved links is broken by re-attaching each
//!    member of the cycle to the root.
//!
//! Without a root, step 3 and 4 fall back to `None` instead. The result never
//! contains a dangling, self-referential or cyclic parent link, and
//! reconciling the same input against the same lineage is idempotent.

use std::collections::HashMap;

use crate::lineage::LineageStore;
use crate::types::{WorktreeNode, WorktreeRecord};

/// Produces the linked node set for one fetch, preserving record order.
pub fn reconcile(records: &[WorktreeRecord], lineage: &LineageStore) -> Vec<WorktreeNode> {
    let mut nodes: Vec<WorktreeNode> = records
        .iter()
        .cloned()
        .map(WorktreeNode::unlinked)
        .collect();

    let root = nodes.iter().position(WorktreeNode::is_main);
    if root.is_none() && !nodes.is_empty() {
        tracing::debug!(count = nodes.len(), "No main worktree in fetch; nodes stay unrooted");
    }

    let by_branch = index_branches(&nodes);
    let mut parents: Vec<Option<usize>> = (0..nodes.len())
        .map(|i| {
            if Some(i) == root {
                None
            } else {
                resolve_parent(i, &nodes, &by_branch, lineage).or(root)
            }
        })
        .collect();

    break_cycles(&mut parents, root);

    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    for (node, parent) in nodes.iter_mut().zip(&parents) {
        node.parent_id = parent.map(|p| ids[p].clone());
    }
    nodes
}

/// Maps each branch to the single node that has it checked out.
/// Branches seen more than once are ambiguous and map to `None`.
fn index_branches(nodes: &[WorktreeNode]) -> HashMap<&str, Option<usize>> {
    let mut by_branch: HashMap<&str, Option<usize>> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        if let Some(branch) = node.branch() {
            by_branch
                .entry(branch)
                .and_modify(|slot| *slot = None)
                .or_insert(Some(i));
        }
    }
    by_branch
}

/// The lineage-derived parent of node `i`, if it resolves within this fetch.
fn resolve_parent(
    i: usize,
    nodes: &[WorktreeNode],
    by_branch: &HashMap<&str, Option<usize>>,
    lineage: &LineageStore,
) -> Option<usize> {
    let branch = nodes[i].branch()?;
    let parent_branch = lineage.lookup_parent(branch)?;

    match by_branch.get(parent_branch).copied().flatten() {
        Some(p) if p != i => Some(p),
        Some(_) => {
            tracing::debug!(branch, "Lineage points at itself, attaching to main");
            None
        }
        None => {
            tracing::debug!(branch, parent_branch, "Parent branch not in fetch, attaching to main");
            None
        }
    }
}

/// Re-attaches every member of a parent cycle to `root`.
fn break_cycles(parents: &mut [Option<usize>], root: Option<usize>) {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNSEEN; parents.len()];
    for start in 0..parents.len() {
        if state[start] != UNSEEN {
            continue;
        }

        let mut path = Vec::new();
        let mut current = Some(start);
        while let Some(c) = current {
            match state[c] {
                DONE => break,
                ON_PATH => {
                    let from = path.iter().position(|&p| p == c).unwrap_or(0);
                    tracing::debug!(members = path.len() - from, "Breaking lineage cycle");
                    for &member in &path[from..] {
                        parents[member] = root.filter(|&r| r != member);
                    }
                    break;
                }
                _ => {
                    state[c] = ON_PATH;
                    path.push(c);
                    current = parents[c];
                }
            }
        }

        for p in path {
            state[p] = DONE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::identify;

    fn record(path: &str, branch: Option<&str>, is_main: bool) -> WorktreeRecord {
        WorktreeRecord::new(path, branch, is_main)
    }

    fn parent_of<'a>(nodes: &'a [WorktreeNode], path: &str) -> Option<&'a str> {
        nodes
            .iter()
            .find(|n| n.path() == path)
            .and_then(|n| n.parent_id.as_deref())
    }

    /// Every parent resolves and every chain ends at a root within n steps.
    fn assert_well_formed(nodes: &[WorktreeNode]) {
        let by_id: HashMap<&str, &WorktreeNode> =
            nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        for node in nodes {
            let mut current = node;
            let mut steps = 0;
            while let Some(parent_id) = current.parent_id.as_deref() {
                assert_ne!(parent_id, current.id, "self link on {}", current.path());
                current = by_id
                    .get(parent_id)
                    .unwrap_or_else(|| panic!("dangling parent {parent_id}"));
                steps += 1;
                assert!(steps <= nodes.len(), "cycle through {}", node.path());
            }
        }
    }

    #[test]
    fn test_ids_are_path_derived() {
        let lineage = LineageStore::new_in_memory();
        let nodes = reconcile(&[record("/r", Some("main"), true)], &lineage);
        assert_eq!(nodes[0].id, identify("/r"));
        assert_eq!(nodes[0].parent_id, None);
    }

    #[test]
    fn test_no_lineage_defaults_to_main() {
        let lineage = LineageStore::new_in_memory();
        let records = vec![
            record("/r", Some("main"), true),
            record("/r-f", Some("feat"), false),
        ];
        let nodes = reconcile(&records, &lineage);
        assert_eq!(parent_of(&nodes, "/r-f"), Some(identify("/r").as_str()));
    }

    #[test]
    fn test_lineage_links_to_present_parent() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("experiment/ui", "feature/auth");
        let records = vec![
            record("/r", Some("main"), true),
            record("/r-auth", Some("feature/auth"), false),
            record("/r-exp", Some("experiment/ui"), false),
        ];
        let nodes = reconcile(&records, &lineage);

        assert_eq!(parent_of(&nodes, "/r-exp"), Some(identify("/r-auth").as_str()));
        assert_eq!(parent_of(&nodes, "/r-auth"), Some(identify("/r").as_str()));
        assert_well_formed(&nodes);
    }

    #[test]
    fn test_missing_parent_branch_falls_back_to_main() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("feat", "other");
        let records = vec![
            record("/r", Some("main"), true),
            record("/r-f", Some("feat"), false),
        ];
        let nodes = reconcile(&records, &lineage);
        assert_eq!(parent_of(&nodes, "/r-f"), Some(identify("/r").as_str()));
    }

    #[test]
    fn test_self_reference_falls_back_to_main() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("feat", "feat");
        let records = vec![
            record("/r", Some("main"), true),
            record("/r-f", Some("feat"), false),
        ];
        let nodes = reconcile(&records, &lineage);
        assert_eq!(parent_of(&nodes, "/r-f"), Some(identify("/r").as_str()));
    }

    #[test]
    fn test_detached_head_attaches_to_main() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("feat", "main");
        let records = vec![
            record("/r", Some("main"), true),
            record("/r-d", None, false),
        ];
        let nodes = reconcile(&records, &lineage);
        assert_eq!(parent_of(&nodes, "/r-d"), Some(identify("/r").as_str()));
    }

    #[test]
    fn test_main_ignores_its_own_lineage_entry() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("main", "feat");
        let records = vec![
            record("/r", Some("main"), true),
            record("/r-f", Some("feat"), false),
        ];
        let nodes = reconcile(&records, &lineage);
        assert_eq!(parent_of(&nodes, "/r"), None);
        assert_eq!(parent_of(&nodes, "/r-f"), Some(identify("/r").as_str()));
    }

    #[test]
    fn test_two_node_cycle_is_broken() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("a", "b");
        lineage.record_parent("b", "a");
        let records = vec![
            record("/r", Some("main"), true),
            record("/r-a", Some("a"), false),
            record("/r-b", Some("b"), false),
        ];
        let nodes = reconcile(&records, &lineage);

        assert_well_formed(&nodes);
        assert_eq!(parent_of(&nodes, "/r-a"), Some(identify("/r").as_str()));
        assert_eq!(parent_of(&nodes, "/r-b"), Some(identify("/r").as_str()));
    }

    #[test]
    fn test_cycle_break_keeps_hanging_branches() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("a", "b");
        lineage.record_parent("b", "c");
        lineage.record_parent("c", "a");
        lineage.record_parent("leaf", "b");
        let records = vec![
            record("/r-leaf", Some("leaf"), false),
            record("/r", Some("main"), true),
            record("/r-a", Some("a"), false),
            record("/r-b", Some("b"), false),
            record("/r-c", Some("c"), false),
        ];
        let nodes = reconcile(&records, &lineage);

        assert_well_formed(&nodes);
        assert_eq!(parent_of(&nodes, "/r-leaf"), Some(identify("/r-b").as_str()));
        for path in ["/r-a", "/r-b", "/r-c"] {
            assert_eq!(parent_of(&nodes, path), Some(identify("/r").as_str()));
        }
    }

    #[test]
    fn test_cycle_result_is_order_independent() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("a", "b");
        lineage.record_parent("b", "a");
        let forward = vec![
            record("/r", Some("main"), true),
            record("/r-a", Some("a"), false),
            record("/r-b", Some("b"), false),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let mut first = reconcile(&forward, &lineage);
        let mut second = reconcile(&reversed, &lineage);
        first.sort_by(|a, b| a.id.cmp(&b.id));
        second.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(first, second);
    }

    #[test]
    fn test_without_main_every_node_is_a_root() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("a", "missing");
        let records = vec![
            record("/r-a", Some("a"), false),
            record("/r-d", None, false),
        ];
        let nodes = reconcile(&records, &lineage);
        assert!(nodes.iter().all(|n| n.parent_id.is_none()));
    }

    #[test]
    fn test_without_main_cycles_still_terminate() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("a", "b");
        lineage.record_parent("b", "a");
        lineage.record_parent("c", "a");
        let records = vec![
            record("/r-a", Some("a"), false),
            record("/r-b", Some("b"), false),
            record("/r-c", Some("c"), false),
        ];
        let nodes = reconcile(&records, &lineage);

        assert_well_formed(&nodes);
        assert_eq!(parent_of(&nodes, "/r-c"), Some(identify("/r-a").as_str()));
    }

    #[test]
    fn test_ambiguous_parent_branch_falls_back() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("feat", "shared");
        let records = vec![
            record("/r", Some("main"), true),
            record("/r-s1", Some("shared"), false),
            record("/r-s2", Some("shared"), false),
            record("/r-f", Some("feat"), false),
        ];
        let nodes = reconcile(&records, &lineage);
        assert_eq!(parent_of(&nodes, "/r-f"), Some(identify("/r").as_str()));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut lineage = LineageStore::new_in_memory();
        lineage.record_parent("b", "a");
        let records = vec![
            record("/r", Some("main"), true),
            record("/r-a", Some("a"), false),
            record("/r-b", Some("b"), false),
            record("/r-d", None, false),
        ];
        assert_eq!(reconcile(&records, &lineage), reconcile(&records, &lineage));
    }

    #[test]
    fn test_generated_lineage_never_produces_bad_links() {
        // Deterministic pseudo-random lineage maps, including cycles and
        // references to branches that are not checked out.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |bound: usize| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % bound as u64) as usize
        };

        for round in 0..200 {
            let count = 1 + next(8);
            let mut records = vec![record("/r", Some("b0"), round % 10 != 0)];
            for i in 1..count {
                let branch = format!("b{i}");
                let detached = next(6) == 0;
                records.push(record(
                    &format!("/r-{i}"),
                    if detached { None } else { Some(branch.as_str()) },
                    false,
                ));
            }

            let mut lineage = LineageStore::new_in_memory();
            for i in 0..count + 2 {
                lineage.record_parent(&format!("b{i}"), &format!("b{}", next(count + 2)));
            }

            let nodes = reconcile(&records, &lineage);
            assert_eq!(nodes.len(), records.len());
            assert_well_formed(&nodes);
        }
    }
}
