//! Per-resource authority: validates and durably applies one commit at a time.

use crate::error::{Result, SyncError};
use crate::router::RequestId;
use crate::snapshot::{Snapshot, SnapshotManager, Validity};
use crate::store::CommitStore;
use crate::types::{Commit, CommitId, GetOutcome, Version};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, error};

/// Terminal reply to a single-commit proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum WorkerReply {
    Accepted { version: Version },
    DuplicateId { id: CommitId, latest: Version },
    SequenceBroken { latest: Version },
    OutOfSync { latest: Version },
    Rejected { id: CommitId, reason: String, latest: Version },
}

/// Exclusive owner of one resource's snapshot and store writes.
///
/// Only ever driven from that resource's worker thread, so no locking is
/// needed around the snapshot.
pub(crate) struct CommitWorker {
    resource: String,
    store: Arc<dyn CommitStore>,
    snapshot: Box<dyn Snapshot>,
    /// Request ids already answered with a failure; redeliveries of these
    /// are dropped silently.
    answered: LruCache<RequestId, ()>,
}

impl CommitWorker {
    /// Rebuild the snapshot from the store and verify they agree on the
    /// current head. A mismatch means the materialized state can no longer
    /// be trusted and the resource must not serve requests.
    pub(crate) fn start(
        resource: &str,
        store: Arc<dyn CommitStore>,
        snapshots: &dyn SnapshotManager,
        cache_capacity: usize,
    ) -> Result<Self> {
        let snapshot = snapshots.rebuild(resource, store.as_ref())?;
        let store_version = store.latest_version(resource)?;
        let snapshot_version = snapshot.version();
        if snapshot_version != store_version {
            error!(
                resource,
                snapshot = %snapshot_version,
                store = %store_version,
                "snapshot diverged from store at startup"
            );
            return Err(SyncError::SnapshotDiverged {
                resource: resource.to_string(),
                snapshot: snapshot_version,
                store: store_version,
            });
        }
        debug!(resource, head = %store_version, "worker started");

        let capacity = NonZeroUsize::new(cache_capacity.max(1)).expect("capacity is nonzero");
        Ok(CommitWorker {
            resource: resource.to_string(),
            store,
            snapshot,
            answered: LruCache::new(capacity),
        })
    }

    /// Validate one proposal against the store and snapshot, applying it if
    /// it extends the current head.
    ///
    /// `Ok(None)` means the request id was already answered and this
    /// delivery is dropped. Failure precedence is fixed: duplicate id, then
    /// broken sequence, then out-of-sync, then semantic rejection.
    pub(crate) fn accept(
        &mut self,
        request: RequestId,
        claimed_previous: &CommitId,
        commit: Commit,
    ) -> Result<Option<WorkerReply>> {
        if self.answered.contains(&request) {
            return Ok(None);
        }

        let latest = self.store.latest_version(&self.resource)?;

        if self.store.exists(&self.resource, &commit.id)? {
            debug!(resource = %self.resource, id = %commit.id, "duplicate commit id");
            self.answered.put(request, ());
            return Ok(Some(WorkerReply::DuplicateId { id: commit.id, latest }));
        }

        if !claimed_previous.is_initial() && !self.store.exists(&self.resource, claimed_previous)? {
            debug!(
                resource = %self.resource,
                claimed = %claimed_previous,
                "claimed predecessor never existed"
            );
            self.answered.put(request, ());
            return Ok(Some(WorkerReply::SequenceBroken { latest }));
        }

        if latest.id != *claimed_previous {
            debug!(
                resource = %self.resource,
                claimed = %claimed_previous,
                head = %latest,
                "claimed predecessor is not the head"
            );
            self.answered.put(request, ());
            return Ok(Some(WorkerReply::OutOfSync { latest }));
        }

        match self.snapshot.validate(&commit) {
            Validity::Invalid { reason } => {
                debug!(resource = %self.resource, id = %commit.id, %reason, "commit rejected");
                self.answered.put(request, ());
                Ok(Some(WorkerReply::Rejected { id: commit.id, reason, latest }))
            }
            Validity::Valid => {
                let version = latest.increment(commit.id.clone());
                self.store.append(&self.resource, commit.clone())?;
                self.snapshot.apply(&commit);
                // Not cached: a retried request lands on the duplicate-id
                // check above and is answered as already applied.
                Ok(Some(WorkerReply::Accepted { version }))
            }
        }
    }

    /// History strictly after `from`, with `from`'s resolved version.
    pub(crate) fn commits_after(&self, from: &CommitId) -> Result<GetOutcome> {
        if !from.is_initial() && !self.store.exists(&self.resource, from)? {
            return Ok(GetOutcome::SequenceBroken {
                latest: self.store.latest_version(&self.resource)?,
            });
        }

        let commits = self.store.commits_after(&self.resource, from)?;
        let previous = if from.is_initial() {
            Version::initial()
        } else {
            Version {
                id: from.clone(),
                sequence: self.store.sequence_of(&self.resource, from)?,
            }
        };
        Ok(GetOutcome::Commits { commits, previous })
    }

    pub(crate) fn latest_version(&self) -> Result<Version> {
        self.store.latest_version(&self.resource)
    }
}
