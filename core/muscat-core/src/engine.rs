//! MuscatEngine - the entry point for clients.
//!
//! Owns every store and the current graph, and wires them to the git backend.
//! Like the rest of the crate it is synchronous and not thread-safe: a client
//! that shares it across threads wraps it in a `Mutex`.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use muscat_core::MuscatEngine;
//!
//! let mut engine = MuscatEngine::new()?;
//! engine.fetch_worktrees("/Users/dev/projects/myapp")?;
//! for node in engine.graph().nodes() {
//!     println!("{} -> {:?}", node.display_branch(), node.parent_id);
//! }
//! ```
//!
//! Worktree operations that fail leave the graph at its last good value and
//! record the message in [`WorktreeGraph::last_error`].

use std::path::PathBuf;
use std::sync::Arc;

use crate::activity::{ActivityPoller, Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{MuscatError, Result};
use crate::graph::{FetchTicket, WorktreeGraph};
use crate::layout::{place_nodes, LayoutEngine, LayoutStore, PlacedNode};
use crate::lineage::LineageStore;
use crate::projects::{Project, ProjectRegistry};
use crate::sessions::{Attachment, SessionRegistry};
use crate::storage::{FileKeyValueStore, SharedStore, StorageConfig};
use crate::transport::{persistent_session_id, transient_session_id, SessionTransport};
use crate::types::{NodePosition, WorktreeNode, WorktreeRecord};
use crate::validation::{default_worktree_path, repo_name_from_path, validate_branch_name};
use crate::vcs::{GitCli, WorktreeBackend};

/// Kind of UI pane a session is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneKind {
    /// Runs the configured command and survives pane teardown.
    Persistent,
    /// A plain shell that is closed with its pane.
    Transient,
}

/// What a pane keeps after opening a session: enough to route input and to
/// detach, never the output history itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneHandle {
    pub worktree_id: String,
    pub session_id: String,
    pub kind: PaneKind,
}

/// Result of [`MuscatEngine::open_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
    pub handle: PaneHandle,
    /// `None` for transient panes, which have no registry record.
    pub attachment: Option<Attachment>,
    /// Buffered output to write into the new pane before live output.
    pub replay: Vec<String>,
}

pub struct MuscatEngine {
    storage: Option<StorageConfig>,
    config: EngineConfig,
    lineage: LineageStore,
    layout: LayoutStore,
    sessions: SessionRegistry,
    projects: ProjectRegistry,
    graph: WorktreeGraph,
    backend: Box<dyn WorktreeBackend>,
    clock: Arc<dyn Clock>,
}

impl MuscatEngine {
    /// Engine over `~/.muscat` and the `git` on `PATH`.
    pub fn new() -> Result<Self> {
        Self::with_storage(StorageConfig::default())
    }

    /// Engine over a custom storage root. Used for testing with temp
    /// directories.
    pub fn with_storage(storage: StorageConfig) -> Result<Self> {
        storage.ensure_dirs().map_err(|e| MuscatError::Io {
            context: format!("Failed to create {}", storage.root().display()),
            source: e,
        })?;
        let store: SharedStore = Arc::new(FileKeyValueStore::new(storage.clone()));
        let mut engine = Self::with_parts(store, Box::new(GitCli::default()), Arc::new(SystemClock));
        engine.storage = Some(storage);
        Ok(engine)
    }

    /// Engine over arbitrary collaborators. The config is read from `store`.
    pub fn with_parts(
        store: SharedStore,
        backend: Box<dyn WorktreeBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = EngineConfig::load(store.as_ref());
        let sessions = SessionRegistry::with_limits(
            config.output_buffer_cap,
            config.idle_threshold(),
            clock.clone(),
        );

        Self {
            storage: None,
            lineage: LineageStore::load(store.clone()),
            layout: LayoutStore::load_from(store.clone()),
            projects: ProjectRegistry::load(store, clock.clone()),
            sessions,
            graph: WorktreeGraph::new(),
            config,
            backend,
            clock,
        }
    }

    /// Storage paths, when the engine is file-backed.
    pub fn storage(&self) -> Option<&StorageConfig> {
        self.storage.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &WorktreeGraph {
        &self.graph
    }

    pub fn lineage(&self) -> &LineageStore {
        &self.lineage
    }

    pub fn layout(&self) -> &LayoutStore {
        &self.layout
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Worktrees API
    // ─────────────────────────────────────────────────────────────────────────────

    /// Lists the worktrees of the repository containing `repo_path` and
    /// reconciles them into the graph.
    pub fn fetch_worktrees(&mut self, repo_path: &str) -> Result<&[WorktreeNode]> {
        let ticket = self.graph.begin_fetch();
        let listing = self.backend.main_repo_path(repo_path).and_then(|main| {
            let records = self.backend.list_worktrees(&main)?;
            Ok((main, records))
        });

        match listing {
            Ok((main, records)) => {
                self.complete_fetch(ticket, &main, records);
                Ok(self.graph.nodes())
            }
            Err(e) => {
                tracing::warn!(repo_path, error = %e, "Failed to fetch worktrees");
                self.graph.fail_fetch(ticket, &e);
                Err(e)
            }
        }
    }

    /// Starts a fetch whose listing the caller runs itself.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.graph.begin_fetch()
    }

    /// Applies a listing started with [`begin_fetch`](Self::begin_fetch).
    /// Returns false when a newer fetch has superseded it.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        main_repo_path: &str,
        records: Vec<WorktreeRecord>,
    ) -> bool {
        if !self
            .graph
            .complete_fetch(ticket, main_repo_path, records, &self.lineage)
        {
            return false;
        }

        let ids = self.graph.nodes().iter().map(|n| n.id.as_str());
        self.layout
            .note_fetch(ids, self.config.prune_positions_after_fetches);
        tracing::debug!(
            repo = main_repo_path,
            nodes = self.graph.nodes().len(),
            "Reconciled worktrees"
        );
        true
    }

    /// Forks `new_branch` off `base_branch` into a new worktree and refreshes
    /// the graph.
    ///
    /// Lineage is recorded before the worktree exists, so the refreshed graph
    /// already links the new node. A failed create restores the previous
    /// lineage entry.
    pub fn fork_worktree(
        &mut self,
        base_branch: &str,
        new_branch: &str,
        path: Option<&str>,
    ) -> Result<WorktreeRecord> {
        validate_branch_name(new_branch)?;
        let repo = self
            .graph
            .main_repo_path()
            .map(str::to_string)
            .ok_or(MuscatError::NoRepository)?;
        let worktree_path = match path {
            Some(path) => PathBuf::from(path),
            None => self.default_worktree_path(&repo, new_branch),
        };
        let worktree_path = worktree_path.to_string_lossy().to_string();

        let previous = self.lineage.lookup_parent(new_branch).map(str::to_string);
        self.lineage.record_parent(new_branch, base_branch);

        let record = match self
            .backend
            .create_worktree(&repo, &worktree_path, new_branch, base_branch)
        {
            Ok(record) => record,
            Err(e) => {
                match previous {
                    Some(parent) => self.lineage.record_parent(new_branch, &parent),
                    None => self.lineage.remove_parent(new_branch),
                }
                self.graph.record_error(&e);
                return Err(e);
            }
        };

        tracing::info!(base_branch, new_branch, path = %worktree_path, "Forked worktree");
        self.refresh(&repo);
        Ok(record)
    }

    /// Where [`fork_worktree`](Self::fork_worktree) puts a branch when no
    /// path is given.
    pub fn default_worktree_path(&self, repo_path: &str, branch: &str) -> PathBuf {
        default_worktree_path(
            &self.config.workspaces_dir,
            &repo_name_from_path(repo_path),
            branch,
        )
    }

    /// Removes the worktree at `path` and refreshes the graph.
    ///
    /// The branch's lineage entry is dropped before git runs and restored if
    /// the removal fails (for instance [`MuscatError::DirtyWorktree`]).
    pub fn remove_worktree(&mut self, path: &str, force: bool) -> Result<()> {
        let repo = self
            .graph
            .main_repo_path()
            .map(str::to_string)
            .ok_or(MuscatError::NoRepository)?;
        let branch = self
            .graph
            .find_by_path(path)
            .and_then(|n| n.branch())
            .map(str::to_string);

        let previous = branch.as_deref().and_then(|b| {
            let parent = self.lineage.lookup_parent(b).map(str::to_string);
            self.lineage.remove_parent(b);
            parent
        });

        if let Err(e) = self.backend.remove_worktree(&repo, path, force) {
            if let (Some(branch), Some(parent)) = (branch.as_deref(), previous) {
                self.lineage.record_parent(branch, &parent);
            }
            self.graph.record_error(&e);
            return Err(e);
        }

        tracing::info!(path, force, "Removed worktree");
        self.refresh(&repo);
        Ok(())
    }

    /// Whether removing the worktree at `path` without `force` would fail.
    pub fn has_uncommitted_changes(&self, path: &str) -> Result<bool> {
        self.backend.has_uncommitted_changes(path)
    }

    /// Sets a lineage entry by hand and relinks the current graph.
    pub fn set_parent(&mut self, branch: &str, parent_branch: &str) {
        self.lineage.record_parent(branch, parent_branch);
        self.graph.relink(&self.lineage);
    }

    pub fn unset_parent(&mut self, branch: &str) {
        self.lineage.remove_parent(branch);
        self.graph.relink(&self.lineage);
    }

    fn refresh(&mut self, repo: &str) {
        if let Err(e) = self.fetch_worktrees(repo) {
            tracing::warn!(repo, error = %e, "Refresh after worktree change failed");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Sessions API
    // ─────────────────────────────────────────────────────────────────────────────

    /// Opens a pane's session in `cwd`.
    ///
    /// Persistent panes reuse the worktree's session if it is still running
    /// and get its buffered output to replay. A stopped session is replaced
    /// by a fresh one. If the transport fails, the registry is left as it was.
    pub fn open_session(
        &mut self,
        transport: &mut dyn SessionTransport,
        worktree_id: &str,
        cwd: &str,
        kind: PaneKind,
    ) -> Result<OpenedSession> {
        match kind {
            PaneKind::Transient => {
                let session_id =
                    transient_session_id(worktree_id, self.clock.now().timestamp_millis());
                transport.create_session(&session_id, cwd, None)?;
                Ok(OpenedSession {
                    handle: PaneHandle {
                        worktree_id: worktree_id.to_string(),
                        session_id,
                        kind,
                    },
                    attachment: None,
                    replay: Vec::new(),
                })
            }
            PaneKind::Persistent => {
                let session_id = persistent_session_id(worktree_id);
                let live = self.sessions.get(worktree_id).filter(|s| !s.is_stopped());
                let replay: Vec<String> = live
                    .map(|s| s.output_buffer.iter().cloned().collect())
                    .unwrap_or_default();

                transport.create_session(
                    &session_id,
                    cwd,
                    Some(self.config.persistent_command.as_str()),
                )?;

                if self.sessions.get(worktree_id).is_some_and(|s| s.is_stopped()) {
                    self.sessions.discard(worktree_id);
                }
                let attachment = self.sessions.create_or_attach(worktree_id, &session_id);
                let session_id = self
                    .sessions
                    .get(worktree_id)
                    .map(|s| s.session_id.clone())
                    .unwrap_or(session_id);

                Ok(OpenedSession {
                    handle: PaneHandle {
                        worktree_id: worktree_id.to_string(),
                        session_id,
                        kind,
                    },
                    attachment: Some(attachment),
                    replay,
                })
            }
        }
    }

    /// Tears down a pane. Persistent sessions keep running and only lose
    /// their connection flag; transient shells are closed.
    pub fn detach_session(
        &mut self,
        transport: &mut dyn SessionTransport,
        handle: &PaneHandle,
    ) -> Result<()> {
        match handle.kind {
            PaneKind::Persistent => {
                self.sessions.set_connected(&handle.worktree_id, false);
                Ok(())
            }
            PaneKind::Transient => transport.close_session(&handle.session_id),
        }
    }

    /// Ends the worktree's persistent session for good.
    pub fn stop_session(
        &mut self,
        transport: &mut dyn SessionTransport,
        worktree_id: &str,
    ) -> Result<()> {
        let session_id = self
            .sessions
            .get(worktree_id)
            .map(|s| s.session_id.clone())
            .ok_or_else(|| MuscatError::SessionNotFound(worktree_id.to_string()))?;
        transport.close_session(&session_id)?;
        self.sessions.stop(worktree_id);
        Ok(())
    }

    pub fn write_input(
        &mut self,
        transport: &mut dyn SessionTransport,
        handle: &PaneHandle,
        data: &str,
    ) -> Result<()> {
        transport.write_input(&handle.session_id, data)
    }

    /// Routes one transport output chunk to the session that owns
    /// `session_id`. Returns false for ids with no registry record, such as
    /// transient shells.
    pub fn on_output(&mut self, session_id: &str, chunk: &str) -> bool {
        let Some(worktree_id) = self
            .sessions
            .find_by_session_id(session_id)
            .map(|s| s.worktree_id.clone())
        else {
            return false;
        };
        self.sessions.append_output(&worktree_id, chunk);
        true
    }

    pub fn replay_output(&self, worktree_id: &str) -> Vec<&str> {
        self.sessions.replay(worktree_id)
    }

    pub fn is_working(&self, worktree_id: &str) -> bool {
        self.sessions.is_working(worktree_id)
    }

    /// A polling schedule for re-reading [`is_working`](Self::is_working),
    /// starting now.
    pub fn activity_poller(&self) -> ActivityPoller {
        ActivityPoller::new(self.config.poll_interval(), self.clock.now())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Layout API
    // ─────────────────────────────────────────────────────────────────────────────

    /// Stores a dragged node's final position.
    pub fn drag_end(&mut self, id: &str, x: f64, y: f64) {
        self.layout.set_position(id, NodePosition::new(x, y));
        self.layout.persist();
    }

    pub fn toggle_auto_layout(&mut self) -> bool {
        self.layout.toggle_auto_layout()
    }

    /// Final positions for the current graph.
    pub fn place_nodes(&self, engine: &dyn LayoutEngine) -> Vec<PlacedNode> {
        place_nodes(engine, self.graph.nodes(), &self.layout)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Projects API
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn projects(&self) -> &ProjectRegistry {
        &self.projects
    }

    pub fn projects_mut(&mut self) -> &mut ProjectRegistry {
        &mut self.projects
    }

    /// Registers the repository containing `path`, makes it active and
    /// fetches its worktrees.
    pub fn open_project(&mut self, path: &str) -> Result<Project> {
        let main = self.backend.main_repo_path(path)?;
        let project = self.projects.add(&main, None);
        self.fetch_worktrees(&main)?;
        Ok(project)
    }
}
