//! # muscat-core
//!
//! Core library for Muscat, a canvas of git worktrees with one long-lived
//! interactive session per worktree.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Clients can wrap with async if needed.
//! - **Not thread-safe**: Clients provide their own synchronization (`Mutex`, `RwLock`).
//! - **Graceful degradation**: Missing or corrupt documents load as empty/default
//!   values, and failed writes are logged, never raised.
//! - **Single owner**: Session history lives only in the [`SessionRegistry`];
//!   panes hold a [`PaneHandle`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use muscat_core::{MuscatEngine, StackedLayout};
//!
//! let mut engine = MuscatEngine::new()?;
//! engine.open_project("/Users/dev/projects/myapp")?;
//! let placed = engine.place_nodes(&StackedLayout);
//! ```

pub mod activity;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod identity;
pub mod layout;
pub mod lineage;
pub mod projects;
pub mod reconcile;
pub mod sessions;
pub mod storage;
pub mod transport;
pub mod types;
pub mod validation;
pub mod vcs;

// Re-export commonly used items at crate root
pub use activity::{is_working, ActivityPoller, Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{MuscatEngine, OpenedSession, PaneHandle, PaneKind};
pub use error::{MuscatError, Result};
pub use graph::{FetchTicket, WorktreeGraph};
pub use identity::identify;
pub use layout::{LayoutEngine, LayoutStore, PlacedNode, StackedLayout};
pub use lineage::LineageStore;
pub use projects::{Project, ProjectRegistry};
pub use reconcile::reconcile;
pub use sessions::{Attachment, Session, SessionRegistry, SessionStatus};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, StorageConfig};
pub use transport::SessionTransport;
pub use types::{GraphEdge, NodePosition, WorktreeNode, WorktreeRecord};
pub use vcs::{GitCli, WorktreeBackend};
