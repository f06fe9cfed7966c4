//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use muscat_core::{
    ManualClock, MemoryKeyValueStore, MuscatEngine, MuscatError, Result, SessionTransport,
    WorktreeBackend, WorktreeRecord,
};

pub const REPO: &str = "/r";

pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
}

/// Mutable state behind [`FakeBackend`], shared with the test body.
#[derive(Default)]
pub struct FakeRepo {
    pub records: Vec<WorktreeRecord>,
    pub dirty: HashSet<String>,
    pub fail_list: bool,
    pub fail_create: bool,
    pub calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    pub repo: Rc<RefCell<FakeRepo>>,
}

impl FakeBackend {
    /// A repository whose primary worktree is `/r` on `main`.
    pub fn with_main() -> Self {
        let backend = Self::default();
        backend
            .repo
            .borrow_mut()
            .records
            .push(WorktreeRecord::new(REPO, Some("main"), true));
        backend
    }

    pub fn add(&self, path: &str, branch: Option<&str>) {
        self.repo
            .borrow_mut()
            .records
            .push(WorktreeRecord::new(path, branch, false));
    }

    pub fn calls(&self) -> Vec<String> {
        self.repo.borrow().calls.clone()
    }
}

fn git_failure(command: &str) -> MuscatError {
    MuscatError::CommandFailed {
        command: command.to_string(),
        details: "fatal: simulated failure".to_string(),
    }
}

impl WorktreeBackend for FakeBackend {
    fn list_worktrees(&self, _repo_path: &str) -> Result<Vec<WorktreeRecord>> {
        let mut repo = self.repo.borrow_mut();
        repo.calls.push("list".to_string());
        if repo.fail_list {
            return Err(git_failure("git worktree list"));
        }
        Ok(repo.records.clone())
    }

    fn create_worktree(
        &self,
        _repo_path: &str,
        worktree_path: &str,
        branch_name: &str,
        base_branch: &str,
    ) -> Result<WorktreeRecord> {
        let mut repo = self.repo.borrow_mut();
        repo.calls
            .push(format!("create {worktree_path} {branch_name} {base_branch}"));
        if repo.fail_create {
            return Err(git_failure("git worktree add"));
        }
        let record = WorktreeRecord::new(worktree_path, Some(branch_name), false);
        repo.records.push(record.clone());
        Ok(record)
    }

    fn remove_worktree(&self, _repo_path: &str, worktree_path: &str, force: bool) -> Result<()> {
        let mut repo = self.repo.borrow_mut();
        repo.calls.push(format!("remove {worktree_path} force={force}"));
        if !force && repo.dirty.contains(worktree_path) {
            return Err(MuscatError::DirtyWorktree {
                path: worktree_path.to_string(),
            });
        }
        repo.records.retain(|r| r.path != worktree_path);
        Ok(())
    }

    fn main_repo_path(&self, _current_path: &str) -> Result<String> {
        Ok(REPO.to_string())
    }

    fn has_uncommitted_changes(&self, worktree_path: &str) -> Result<bool> {
        Ok(self.repo.borrow().dirty.contains(worktree_path))
    }
}

/// Transport that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingTransport {
    pub created: Vec<(String, String, Option<String>)>,
    pub inputs: Vec<(String, String)>,
    pub closed: Vec<String>,
    pub fail: bool,
}

impl RecordingTransport {
    fn check(&self, session_id: &str) -> Result<()> {
        if self.fail {
            return Err(MuscatError::Transport {
                session_id: session_id.to_string(),
                details: "pty unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl SessionTransport for RecordingTransport {
    fn create_session(&mut self, session_id: &str, cwd: &str, command: Option<&str>) -> Result<()> {
        self.check(session_id)?;
        self.created.push((
            session_id.to_string(),
            cwd.to_string(),
            command.map(str::to_string),
        ));
        Ok(())
    }

    fn write_input(&mut self, session_id: &str, data: &str) -> Result<()> {
        self.check(session_id)?;
        self.inputs.push((session_id.to_string(), data.to_string()));
        Ok(())
    }

    fn close_session(&mut self, session_id: &str) -> Result<()> {
        self.check(session_id)?;
        self.closed.push(session_id.to_string());
        Ok(())
    }
}

/// Engine over an in-memory store, the given backend and a manual clock.
pub fn engine_with(backend: FakeBackend) -> (MuscatEngine, Arc<MemoryKeyValueStore>, ManualClock) {
    let store = MemoryKeyValueStore::shared();
    let clock = ManualClock::new(start());
    let engine = MuscatEngine::with_parts(
        store.clone(),
        Box::new(backend),
        Arc::new(clock.clone()),
    );
    (engine, store, clock)
}
