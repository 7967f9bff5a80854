//! Error types for the synchronization engine.
//!
//! Protocol conflicts (`SequenceBroken`, `OutOfSync`, ...) are ordinary
//! outcome values in [`crate::types`]; this module only covers
//! infrastructure faults.

use crate::types::{CommitId, Version};
use thiserror::Error;

/// Infrastructure fault surfaced through a [`ResponseFuture`](crate::ResponseFuture).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The rebuilt snapshot does not match the store's head. Fatal at
    /// worker startup; the resource stays unavailable until resolved.
    #[error("snapshot for {resource} diverged from store: snapshot {snapshot}, store {store}")]
    SnapshotDiverged {
        resource: String,
        snapshot: Version,
        store: Version,
    },

    /// The store broke its contract: a sequence lookup for an id it
    /// reported as present.
    #[error("commit {id} not found in {resource}")]
    UnknownCommit { resource: String, id: CommitId },

    /// Per-resource pending-request depth exceeded; the request was
    /// rejected without being queued.
    #[error("request queue for {resource} is full")]
    QueueFull { resource: String },

    /// The engine has been closed.
    #[error("engine is closed")]
    Closed,

    /// The resource worker terminated without answering.
    #[error("resource worker terminated before replying")]
    Terminated,

    /// `wait_timeout` elapsed before the result arrived. The operation may
    /// still complete internally; its result is discarded.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// The per-resource worker thread could not be spawned.
    #[error("failed to spawn resource worker: {0}")]
    Spawn(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
