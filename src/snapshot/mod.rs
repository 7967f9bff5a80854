//! Snapshot contract: materialized state derived by replaying commits.

mod room;

pub use room::{RoomMessage, RoomSnapshot, RoomSnapshotManager};

use crate::error::Result;
use crate::store::CommitStore;
use crate::types::{Commit, CommitId, Version};

/// Answer of a domain precondition check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid { reason: String },
}

impl Validity {
    /// `Valid` when `condition` holds, otherwise `Invalid` with `reason`.
    pub fn require(condition: bool, reason: &str) -> Self {
        if condition {
            Validity::Valid
        } else {
            Validity::Invalid {
                reason: reason.to_string(),
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// State materialized from a resource's commit history.
///
/// Used only for semantic validation of incoming commits; the store is the
/// authority. A snapshot must always be reconstructible by replaying the
/// store from the initial version, and its version advances in lock-step
/// with the commits applied to it.
pub trait Snapshot: Send {
    /// Version of the last commit applied.
    fn version(&self) -> Version;

    /// Check a commit against the domain's preconditions. Must not mutate.
    fn validate(&self, commit: &Commit) -> Validity;

    /// Apply an accepted commit, advancing the internal version.
    fn apply(&mut self, commit: &Commit);
}

/// Builds the snapshot a resource worker starts from.
pub trait SnapshotManager: Send + Sync {
    /// Materialize the resource's current state by replaying its full
    /// history from the initial version.
    fn rebuild(&self, resource: &str, store: &dyn CommitStore) -> Result<Box<dyn Snapshot>>;
}

/// Replay a resource's full history into `snapshot`. Returns the number of
/// commits applied.
pub fn replay(
    snapshot: &mut dyn Snapshot,
    resource: &str,
    store: &dyn CommitStore,
) -> Result<usize> {
    let commits = store.commits_after(resource, &CommitId::initial())?;
    let applied = commits.len();
    for commit in &commits {
        snapshot.apply(commit);
    }
    Ok(applied)
}
