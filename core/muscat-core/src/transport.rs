//! Seam to the process/pty side of a session.
//!
//! The transport owns the actual processes; the registry owns their history.
//! Output arrives as opaque text chunks keyed by session id and is fed back
//! through [`crate::engine::MuscatEngine::on_output`].

use crate::error::Result;

pub trait SessionTransport {
    /// Starts (or re-adopts) the process behind `session_id` in `cwd`.
    /// `command = None` starts the user's shell.
    fn create_session(&mut self, session_id: &str, cwd: &str, command: Option<&str>)
        -> Result<()>;

    fn write_input(&mut self, session_id: &str, data: &str) -> Result<()>;

    fn close_session(&mut self, session_id: &str) -> Result<()>;
}

/// Session id of the persistent pane for a worktree. Stable across remounts.
pub fn persistent_session_id(worktree_id: &str) -> String {
    format!("claude-{worktree_id}")
}

/// Session id of a throwaway shell pane, unique per mount.
pub fn transient_session_id(worktree_id: &str, epoch_millis: i64) -> String {
    format!("shell-{worktree_id}-{epoch_millis}")
}
