//! Per-resource serializer: turns batch posts into chained single-commit
//! proposals and aggregates the replies.

use crate::router::{Correlator, RequestId};
use crate::snapshot::SnapshotManager;
use crate::store::CommitStore;
use crate::types::{Commit, CommitId, PostOutcome, Version};
use crate::worker::{CommitWorker, WorkerReply};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::{debug, error};

/// Mailbox message for a resource's worker thread.
pub(crate) enum QueueRequest {
    Post {
        request: RequestId,
        previous: CommitId,
        commits: Vec<Commit>,
    },
    Get {
        request: RequestId,
        from: CommitId,
    },
}

impl QueueRequest {
    pub(crate) fn request_id(&self) -> RequestId {
        match self {
            QueueRequest::Post { request, .. } | QueueRequest::Get { request, .. } => *request,
        }
    }
}

/// Thread body for one resource: build the worker, then serve the mailbox
/// FIFO until every sender is gone.
///
/// Queueing and commit application share this single thread, so no two
/// operations on the same resource ever run concurrently while distinct
/// resources proceed in parallel.
pub(crate) fn run(
    resource: String,
    receiver: Receiver<QueueRequest>,
    store: Arc<dyn CommitStore>,
    snapshots: Arc<dyn SnapshotManager>,
    correlator: Arc<Correlator>,
    dedup_capacity: usize,
    on_exit: impl FnOnce(),
) {
    let worker = match CommitWorker::start(&resource, store, snapshots.as_ref(), dedup_capacity) {
        Ok(worker) => worker,
        Err(e) => {
            error!(%resource, error = %e, "resource worker failed to start");
            // Leave the directory first so no further requests are routed
            // here, then fail everything already queued. A later request
            // spawns a fresh worker that re-attempts the rebuild.
            on_exit();
            for request in receiver.iter() {
                correlator.fail(request.request_id(), e.clone());
            }
            return;
        }
    };

    let mut queue = CommitQueue {
        resource: resource.clone(),
        worker,
        correlator,
    };

    for request in receiver.iter() {
        match request {
            QueueRequest::Post { request, previous, commits } => {
                queue.handle_post(request, previous, commits)
            }
            QueueRequest::Get { request, from } => queue.handle_get(request, from),
        }
    }

    debug!(%resource, "resource worker stopped");
    on_exit();
}

/// Serializes one resource's requests against its worker.
pub(crate) struct CommitQueue {
    resource: String,
    worker: CommitWorker,
    correlator: Arc<Correlator>,
}

impl CommitQueue {
    #[cfg(test)]
    pub(crate) fn new(resource: &str, worker: CommitWorker, correlator: Arc<Correlator>) -> Self {
        CommitQueue {
            resource: resource.to_string(),
            worker,
            correlator,
        }
    }

    /// Chain a batch into single-commit proposals and feed them to the
    /// worker in order.
    ///
    /// Every proposal is dispatched even after a failure; the worker's
    /// request-id cache drops the tail silently, and only the first failure
    /// reaches the caller. Accepted prefix commits are never rolled back.
    pub(crate) fn handle_post(
        &mut self,
        request: RequestId,
        previous: CommitId,
        commits: Vec<Commit>,
    ) {
        if commits.is_empty() {
            match self.worker.latest_version() {
                Ok(latest) => self.correlator.resolve_post(
                    request,
                    Ok(PostOutcome::Acks { acked: Vec::new(), latest }),
                ),
                Err(e) => self.correlator.fail(request, e),
            }
            return;
        }

        let total = commits.len();
        let mut acked: Vec<Version> = Vec::with_capacity(total);
        let mut failure: Option<PostOutcome> = None;
        let mut claimed = previous;

        for commit in commits {
            let next_claim = commit.id.clone();
            let reply = match self.worker.accept(request, &claimed, commit) {
                Ok(reply) => reply,
                Err(e) => {
                    error!(resource = %self.resource, request = %request, error = %e, "store fault");
                    self.correlator.fail(request, e);
                    return;
                }
            };
            claimed = next_claim;

            let conflict = match reply {
                None => continue,
                Some(WorkerReply::Accepted { version }) => {
                    acked.push(version);
                    continue;
                }
                Some(WorkerReply::DuplicateId { id, latest }) => PostOutcome::InvalidCommitId {
                    id,
                    acked: Self::acked_ids(&acked),
                    latest,
                },
                Some(WorkerReply::SequenceBroken { latest }) => {
                    PostOutcome::SequenceBroken { latest }
                }
                Some(WorkerReply::OutOfSync { latest }) => PostOutcome::OutOfSync { latest },
                Some(WorkerReply::Rejected { id, reason, latest }) => PostOutcome::InvalidState {
                    id,
                    reason,
                    acked: Self::acked_ids(&acked),
                    latest,
                },
            };
            // Only the first conflict reaches the caller; the worker's
            // cache drops the rest of the chain anyway.
            if failure.is_none() {
                failure = Some(conflict);
            }
        }

        if let Some(outcome) = failure {
            self.correlator.resolve_post(request, Ok(outcome));
        } else if let (true, Some(latest)) = (acked.len() == total, acked.last().cloned()) {
            self.correlator.resolve_post(
                request,
                Ok(PostOutcome::Acks {
                    acked: Self::acked_ids(&acked),
                    latest,
                }),
            );
        } else {
            // Redelivery of an already-answered request: the whole chain was
            // dropped by the worker's cache. Stay silent.
            debug!(resource = %self.resource, request = %request, "dropped redelivered batch");
        }
    }

    /// Pass-through to the worker's history read.
    pub(crate) fn handle_get(&mut self, request: RequestId, from: CommitId) {
        match self.worker.commits_after(&from) {
            Ok(outcome) => self.correlator.resolve_get(request, Ok(outcome)),
            Err(e) => self.correlator.fail(request, e),
        }
    }

    fn acked_ids(acked: &[Version]) -> Vec<CommitId> {
        acked.iter().map(|version| version.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::RoomSnapshotManager;
    use crate::store::MemoryStore;
    use crate::types::CommitContent;

    fn join(id: &str, user: &str) -> Commit {
        Commit::new(id, CommitContent::Join { user_id: user.into() })
    }

    fn post(id: &str, user: &str, message: &str) -> Commit {
        Commit::new(
            id,
            CommitContent::Post {
                user_id: user.into(),
                message: message.into(),
            },
        )
    }

    fn leave(id: &str, user: &str) -> Commit {
        Commit::new(id, CommitContent::Leave { user_id: user.into() })
    }

    fn queue_with(store: Arc<MemoryStore>) -> (CommitQueue, Arc<Correlator>) {
        let correlator = Arc::new(Correlator::new());
        let worker =
            CommitWorker::start("room", store, &RoomSnapshotManager::new(), 100).unwrap();
        (
            CommitQueue::new("room", worker, Arc::clone(&correlator)),
            correlator,
        )
    }

    #[test]
    fn test_batch_fully_accepted() {
        let store = Arc::new(MemoryStore::new());
        let (mut queue, correlator) = queue_with(Arc::clone(&store));
        let (request, future) = correlator.register_post();

        queue.handle_post(
            request,
            CommitId::initial(),
            vec![
                join("i1", "u1"),
                post("i2", "u1", "Hello"),
                leave("i3", "u1"),
            ],
        );

        match future.try_wait().unwrap().unwrap() {
            PostOutcome::Acks { acked, latest } => {
                assert_eq!(acked, vec!["i1".into(), "i2".into(), "i3".into()]);
                assert_eq!(latest, Version { id: "i3".into(), sequence: 2 });
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.len("room"), 3);
    }

    #[test]
    fn test_empty_batch_answers_latest() {
        let store = Arc::new(MemoryStore::new());
        store.append("room", join("c1", "u1")).unwrap();
        let (mut queue, correlator) = queue_with(store);
        let (request, future) = correlator.register_post();

        queue.handle_post(request, CommitId::initial(), Vec::new());

        match future.try_wait().unwrap().unwrap() {
            PostOutcome::Acks { acked, latest } => {
                assert!(acked.is_empty());
                assert_eq!(latest.id.as_str(), "c1");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_mid_batch_rejection_keeps_prefix() {
        let store = Arc::new(MemoryStore::new());
        let (mut queue, correlator) = queue_with(Arc::clone(&store));
        let (request, future) = correlator.register_post();

        // Second join violates occupancy; the third commit is dropped.
        queue.handle_post(
            request,
            CommitId::initial(),
            vec![
                join("c1", "u1"),
                join("c2", "u1"),
                post("c3", "u1", "never lands"),
            ],
        );

        match future.try_wait().unwrap().unwrap() {
            PostOutcome::InvalidState { id, reason, acked, latest } => {
                assert_eq!(id.as_str(), "c2");
                assert_eq!(reason, "User already joined.");
                assert_eq!(acked, vec![CommitId::from("c1")]);
                assert_eq!(latest.id.as_str(), "c1");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.len("room"), 1);
    }

    #[test]
    fn test_out_of_sync_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.append("room", join("c1", "u1")).unwrap();
        store.append("room", leave("c2", "u1")).unwrap();
        let (mut queue, correlator) = queue_with(Arc::clone(&store));
        let (request, future) = correlator.register_post();

        queue.handle_post(request, "c1".into(), vec![join("c3", "u2"), join("c4", "u3")]);

        match future.try_wait().unwrap().unwrap() {
            PostOutcome::OutOfSync { latest } => {
                assert_eq!(latest, Version { id: "c2".into(), sequence: 1 });
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.len("room"), 2);
    }

    #[test]
    fn test_ghost_predecessor_breaks_sequence() {
        let store = Arc::new(MemoryStore::new());
        let (mut queue, correlator) = queue_with(Arc::clone(&store));
        let (request, future) = correlator.register_post();

        queue.handle_post(request, "ghost".into(), vec![join("c1", "u1")]);

        assert!(matches!(
            future.try_wait().unwrap().unwrap(),
            PostOutcome::SequenceBroken { .. }
        ));
        assert!(store.is_empty("room"));
    }

    #[test]
    fn test_duplicate_id_reports_prefix_acks() {
        let store = Arc::new(MemoryStore::new());
        store.append("room", join("c1", "u1")).unwrap();
        let (mut queue, correlator) = queue_with(Arc::clone(&store));
        let (request, future) = correlator.register_post();

        // c2 is fresh, c1 is already committed.
        queue.handle_post(request, "c1".into(), vec![join("c2", "u2"), join("c1", "u3")]);

        match future.try_wait().unwrap().unwrap() {
            PostOutcome::InvalidCommitId { id, acked, latest } => {
                assert_eq!(id.as_str(), "c1");
                assert_eq!(acked, vec![CommitId::from("c2")]);
                assert_eq!(latest.id.as_str(), "c2");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.len("room"), 2);
    }

    #[test]
    fn test_redelivered_failed_batch_is_silent() {
        let store = Arc::new(MemoryStore::new());
        let (mut queue, correlator) = queue_with(Arc::clone(&store));
        let (request, future) = correlator.register_post();

        queue.handle_post(request, "ghost".into(), vec![join("c1", "u1")]);
        assert!(matches!(
            future.try_wait().unwrap().unwrap(),
            PostOutcome::SequenceBroken { .. }
        ));

        // Redelivery with the same request id: dropped by the worker cache,
        // answered by nobody.
        queue.handle_post(request, "ghost".into(), vec![join("c1", "u1")]);
        assert!(store.is_empty("room"));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_get_passes_through() {
        let store = Arc::new(MemoryStore::new());
        store.append("room", join("c1", "u1")).unwrap();
        let (mut queue, correlator) = queue_with(store);
        let (request, future) = correlator.register_get();

        queue.handle_get(request, CommitId::initial());

        match future.try_wait().unwrap().unwrap() {
            crate::types::GetOutcome::Commits { commits, previous } => {
                assert_eq!(commits.len(), 1);
                assert!(previous.is_initial());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
