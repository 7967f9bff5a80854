//! Commit store contract and the in-memory reference implementation.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{Commit, CommitId, Version};

/// Append-only per-resource commit history.
///
/// A resource's worker is the only writer for that resource; the store just
/// has to keep each history ordered and never mutate past entries.
/// Implementations synchronize internally so distinct resources can be
/// served in parallel.
pub trait CommitStore: Send + Sync {
    /// Version of the newest commit, or the initial version for an empty
    /// (or unknown) resource.
    fn latest_version(&self, resource: &str) -> Result<Version>;

    /// Whether `id` names a commit in the resource's history.
    fn exists(&self, resource: &str, id: &CommitId) -> Result<bool>;

    /// Look up a single commit.
    fn get(&self, resource: &str, id: &CommitId) -> Result<Option<Commit>>;

    /// All commits strictly after `id`, oldest first. The initial sentinel
    /// yields the full history.
    fn commits_after(&self, resource: &str, id: &CommitId) -> Result<Vec<Commit>>;

    /// Zero-based position of `id` in the history. Errors with
    /// [`SyncError::UnknownCommit`](crate::SyncError::UnknownCommit) if absent.
    fn sequence_of(&self, resource: &str, id: &CommitId) -> Result<i64>;

    /// Append a commit. The caller has already verified id uniqueness.
    fn append(&self, resource: &str, commit: Commit) -> Result<()>;
}
