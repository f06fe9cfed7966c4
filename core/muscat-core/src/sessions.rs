//! Persistent interactive sessions, one per worktree.
//!
//! The registry is the only owner of session records. A UI pane holds just
//! the worktree id and session id; detaching it flips `is_connected` and
//! keeps the buffered output so a later pane can replay it.
//!
//! ## Lifecycle
//!
//! ```text
//! create_or_attach ──► Idle ◄──(idle threshold)──► Working ◄── append_output
//!                        │                            │
//!                        └────────── stop ────────────┴──► Stopped (terminal)
//! ```
//!
//! The Idle ⇄ Working edge driven by time is never written back: it is
//! derived on read by [`crate::activity::is_working`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::{is_working, Clock, SystemClock, DEFAULT_IDLE_THRESHOLD};

/// Default number of output chunks kept per session.
pub const DEFAULT_OUTPUT_BUFFER_CAP: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Working,
    Stopped,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Working => write!(f, "working"),
            SessionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub worktree_id: String,
    /// Handle of the process on the transport side.
    pub session_id: String,
    pub status: SessionStatus,
    pub last_activity_at: DateTime<Utc>,
    /// Recent output, oldest first.
    pub output_buffer: VecDeque<String>,
    /// Whether a UI pane is attached. Independent of process liveness.
    pub is_connected: bool,
}

impl Session {
    pub fn new(worktree_id: &str, session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            worktree_id: worktree_id.to_string(),
            session_id: session_id.to_string(),
            status: SessionStatus::Idle,
            last_activity_at: now,
            output_buffer: VecDeque::new(),
            is_connected: true,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.status == SessionStatus::Stopped
    }
}

/// Result of [`SessionRegistry::create_or_attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// A fresh session record was created.
    Created,
    /// An existing record was reattached; its history is untouched.
    Reattached,
}

pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    buffer_cap: usize,
    idle_threshold: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_limits(DEFAULT_OUTPUT_BUFFER_CAP, DEFAULT_IDLE_THRESHOLD, clock)
    }

    pub fn with_limits(buffer_cap: usize, idle_threshold: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: HashMap::new(),
            buffer_cap,
            idle_threshold,
            clock,
        }
    }

    pub fn buffer_cap(&self) -> usize {
        self.buffer_cap
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    /// Creates the session for `worktree_id`, or marks the existing one connected.
    ///
    /// Reattaching never touches the buffer, status, activity time or the
    /// existing session id.
    pub fn create_or_attach(&mut self, worktree_id: &str, session_id: &str) -> Attachment {
        if let Some(session) = self.sessions.get_mut(worktree_id) {
            session.is_connected = true;
            tracing::debug!(worktree_id, session_id = %session.session_id, "Reattached session");
            return Attachment::Reattached;
        }

        let session = Session::new(worktree_id, session_id, self.clock.now());
        self.sessions.insert(worktree_id.to_string(), session);
        tracing::info!(worktree_id, session_id, "Created session");
        Attachment::Created
    }

    /// Buffers one output chunk and marks the session working.
    ///
    /// No-op for unknown worktrees. A stopped session still buffers the chunk
    /// but stays stopped.
    pub fn append_output(&mut self, worktree_id: &str, chunk: &str) {
        let Some(session) = self.sessions.get_mut(worktree_id) else {
            return;
        };

        session.output_buffer.push_back(chunk.to_string());
        while session.output_buffer.len() > self.buffer_cap {
            session.output_buffer.pop_front();
        }

        if session.status != SessionStatus::Stopped {
            session.status = SessionStatus::Working;
            session.last_activity_at = self.clock.now();
        }
    }

    pub fn set_connected(&mut self, worktree_id: &str, connected: bool) {
        if let Some(session) = self.sessions.get_mut(worktree_id) {
            session.is_connected = connected;
        }
    }

    /// Moves the session to the terminal `Stopped` state.
    pub fn stop(&mut self, worktree_id: &str) {
        if let Some(session) = self.sessions.get_mut(worktree_id) {
            session.status = SessionStatus::Stopped;
            tracing::info!(worktree_id, session_id = %session.session_id, "Stopped session");
        }
    }

    /// Drops a session record entirely, returning it.
    pub fn discard(&mut self, worktree_id: &str) -> Option<Session> {
        self.sessions.remove(worktree_id)
    }

    pub fn get(&self, worktree_id: &str) -> Option<&Session> {
        self.sessions.get(worktree_id)
    }

    /// Finds the session whose transport handle is `session_id`.
    pub fn find_by_session_id(&self, session_id: &str) -> Option<&Session> {
        self.sessions.values().find(|s| s.session_id == session_id)
    }

    /// Buffered output for replay on reconnect, oldest first.
    pub fn replay(&self, worktree_id: &str) -> Vec<&str> {
        self.sessions
            .get(worktree_id)
            .map(|s| s.output_buffer.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Derived working/idle status as of the registry clock.
    pub fn is_working(&self, worktree_id: &str) -> bool {
        is_working(self.get(worktree_id), self.clock.now(), self.idle_threshold)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
