//! Error types for muscat-core operations.
//!
//! Only transport failures (git, session commands) and caller mistakes surface
//! as errors. Storage failures are absorbed by the stores and never reach here.

// ═══════════════════════════════════════════════════════════════════════════════
// Error
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can surface from muscat-core operations.
#[derive(Debug, thiserror::Error)]
pub enum MuscatError {
    // ─────────────────────────────────────────────────────────────────────
    // VCS Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Worktree has uncommitted changes: {path}")]
    DirtyWorktree { path: String },

    #[error("Invalid branch name '{name}': {reason}")]
    InvalidBranchName { name: String, reason: String },

    #[error("No repository path set")]
    NoRepository,

    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("No session for worktree: {0}")]
    SessionNotFound(String),

    #[error("Session transport failed: {session_id}: {details}")]
    Transport { session_id: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using MuscatError.
pub type Result<T> = std::result::Result<T, MuscatError>;

// Conversion for string error compatibility
impl From<MuscatError> for String {
    fn from(err: MuscatError) -> String {
        err.to_string()
    }
}
