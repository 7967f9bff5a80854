//! # Lockstep
//!
//! A per-resource commit-log synchronization engine. Each resource owns an
//! ordered, append-only sequence of commits; concurrent proposers submit
//! commits that claim a predecessor, and the engine enforces a single total
//! order per resource while resources proceed fully in parallel.
//!
//! ## Core Concepts
//!
//! - **Commits**: immutable, id'd state transitions appended to a resource
//! - **Versions**: `(commit id, sequence)` pointers into a history
//! - **Conflict outcomes**: four distinct values (`SequenceBroken`,
//!   `OutOfSync`, `InvalidCommitId`, `InvalidState`), each implying a
//!   different client recovery action
//! - **Snapshots**: state materialized by replay, used for semantic
//!   validation only
//!
//! ## Example
//!
//! ```ignore
//! use lockstep::{Commit, CommitContent, CommitId, Engine, MemoryStore, RoomSnapshotManager};
//! use std::sync::Arc;
//!
//! let engine = Engine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(RoomSnapshotManager::new()),
//! );
//!
//! let outcome = engine
//!     .post_commits(
//!         "room-1",
//!         CommitId::initial(),
//!         vec![Commit::new("c1", CommitContent::Join { user_id: "user1".into() })],
//!     )
//!     .wait()?;
//!
//! // Catch up from any known point.
//! let history = engine.get_commits("room-1", CommitId::initial()).wait()?;
//! ```

pub mod engine;
pub mod error;
mod future;
mod queue;
pub mod replica;
mod router;
pub mod snapshot;
pub mod store;
pub mod types;
mod worker;

// Re-exports
pub use engine::{Engine, EngineConfig};
pub use error::{Result, SyncError};
pub use future::ResponseFuture;
pub use replica::ReplicaStore;
pub use snapshot::{
    replay, RoomMessage, RoomSnapshot, RoomSnapshotManager, Snapshot, SnapshotManager, Validity,
};
pub use store::{CommitStore, MemoryStore};
pub use types::*;
