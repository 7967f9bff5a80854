//! Public facade over the router/queue/worker pipeline.

use crate::future::ResponseFuture;
use crate::router::Router;
use crate::snapshot::SnapshotManager;
use crate::store::CommitStore;
use crate::types::{Commit, CommitId, GetOutcome, PostOutcome};
use std::sync::Arc;

/// Engine tuning knobs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Per-resource pending-request depth. Dispatch fails fast with
    /// [`SyncError::QueueFull`](crate::SyncError::QueueFull) beyond it.
    pub queue_depth: usize,

    /// Capacity of each worker's recent-request-id cache, used to drop
    /// redeliveries of already-answered requests.
    pub dedup_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_depth: 1024,
            dedup_cache_size: 100,
        }
    }
}

/// The synchronization engine: one linear, race-free commit history per
/// resource, full parallelism across resources.
///
/// Both entry points are asynchronous; they return a
/// [`ResponseFuture`] resolving to exactly one outcome value. Protocol
/// conflicts are outcomes, never errors — only infrastructure faults fail
/// the future.
pub struct Engine {
    router: Router,
}

impl Engine {
    /// Build an engine over an injected store and snapshot manager.
    pub fn new(store: Arc<dyn CommitStore>, snapshots: Arc<dyn SnapshotManager>) -> Self {
        Self::with_config(store, snapshots, EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn CommitStore>,
        snapshots: Arc<dyn SnapshotManager>,
        config: EngineConfig,
    ) -> Self {
        Engine {
            router: Router::new(store, snapshots, config),
        }
    }

    /// Propose a batch of commits whose first element claims
    /// `previous_commit_id` as its predecessor; each later element chains
    /// onto the one before it. An empty batch just reports the resource's
    /// latest version.
    pub fn post_commits(
        &self,
        resource: &str,
        previous_commit_id: CommitId,
        commits: Vec<Commit>,
    ) -> ResponseFuture<PostOutcome> {
        self.router.post(resource, previous_commit_id, commits)
    }

    /// Fetch all commits strictly after `from_commit_id` (the initial
    /// sentinel replays the full history).
    pub fn get_commits(&self, resource: &str, from_commit_id: CommitId) -> ResponseFuture<GetOutcome> {
        self.router.get(resource, from_commit_id)
    }

    /// Shut down every resource worker. In-flight requests are answered
    /// first; anything unanswered fails with
    /// [`SyncError::Closed`](crate::SyncError::Closed), as do later calls.
    pub fn close(&self) {
        self.router.close();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}
