//! Resource directory and request/response correlation.

use crate::engine::EngineConfig;
use crate::error::{Result, SyncError};
use crate::future::{response_channel, Promise, ResponseFuture};
use crate::queue::{self, QueueRequest};
use crate::snapshot::SnapshotManager;
use crate::store::CommitStore;
use crate::types::{Commit, CommitId, GetOutcome, PostOutcome};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// How many times dispatch will recreate a worker that disconnected
/// between directory lookup and send.
const DISPATCH_ATTEMPTS: usize = 3;

/// Identifier correlating a request with its eventual reply. Unique only
/// for the lifetime of the in-flight operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RequestId(pub(crate) u64);

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pending-future registry: request id to caller promise, post and get
/// tracked separately. Each entry resolves exactly once; late replies for
/// discarded ids are ignored.
pub(crate) struct Correlator {
    next_id: AtomicU64,
    posts: Mutex<HashMap<RequestId, Promise<PostOutcome>>>,
    gets: Mutex<HashMap<RequestId, Promise<GetOutcome>>>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Correlator {
            next_id: AtomicU64::new(1),
            posts: Mutex::new(HashMap::new()),
            gets: Mutex::new(HashMap::new()),
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn register_post(&self) -> (RequestId, ResponseFuture<PostOutcome>) {
        let id = self.next_request_id();
        let (promise, future) = response_channel();
        self.posts.lock().insert(id, promise);
        (id, future)
    }

    pub(crate) fn register_get(&self) -> (RequestId, ResponseFuture<GetOutcome>) {
        let id = self.next_request_id();
        let (promise, future) = response_channel();
        self.gets.lock().insert(id, promise);
        (id, future)
    }

    pub(crate) fn resolve_post(&self, id: RequestId, result: Result<PostOutcome>) {
        if let Some(promise) = self.posts.lock().remove(&id) {
            promise.complete(result);
        }
    }

    pub(crate) fn resolve_get(&self, id: RequestId, result: Result<GetOutcome>) {
        if let Some(promise) = self.gets.lock().remove(&id) {
            promise.complete(result);
        }
    }

    /// Fail whichever pending request carries `id`.
    pub(crate) fn fail(&self, id: RequestId, error: SyncError) {
        if let Some(promise) = self.posts.lock().remove(&id) {
            promise.complete(Err(error));
        } else if let Some(promise) = self.gets.lock().remove(&id) {
            promise.complete(Err(error));
        }
    }

    /// Fail everything still pending.
    pub(crate) fn abort_all(&self, error: SyncError) {
        for (_, promise) in self.posts.lock().drain() {
            promise.complete(Err(error.clone()));
        }
        for (_, promise) in self.gets.lock().drain() {
            promise.complete(Err(error.clone()));
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_count(&self) -> usize {
        self.posts.lock().len() + self.gets.lock().len()
    }
}

/// Directory entry for one resource's live worker thread.
struct QueueSlot {
    sender: Sender<QueueRequest>,
    generation: u64,
    join: Option<JoinHandle<()>>,
}

struct Shared {
    store: Arc<dyn CommitStore>,
    snapshots: Arc<dyn SnapshotManager>,
    config: EngineConfig,
    correlator: Arc<Correlator>,
    queues: Mutex<HashMap<String, QueueSlot>>,
    next_generation: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    /// Locate the resource's queue, spawning its worker thread on first
    /// access. Generations distinguish a stale slot from its replacement.
    fn ensure_queue(self: &Arc<Self>, resource: &str) -> Result<(Sender<QueueRequest>, u64)> {
        let mut queues = self.queues.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::Closed);
        }
        if let Some(slot) = queues.get(resource) {
            return Ok((slot.sender.clone(), slot.generation));
        }

        let (sender, receiver) = bounded(self.config.queue_depth);
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::downgrade(self);
        let thread_resource = resource.to_string();
        let exit_resource = resource.to_string();
        let store = Arc::clone(&self.store);
        let snapshots = Arc::clone(&self.snapshots);
        let correlator = Arc::clone(&self.correlator);
        let dedup_capacity = self.config.dedup_cache_size;

        let join = thread::Builder::new()
            .name(format!("lockstep-{resource}"))
            .spawn(move || {
                queue::run(
                    thread_resource,
                    receiver,
                    store,
                    snapshots,
                    correlator,
                    dedup_capacity,
                    move || {
                        if let Some(shared) = shared.upgrade() {
                            shared.drop_queue(&exit_resource, generation);
                        }
                    },
                )
            })
            .map_err(|e| SyncError::Spawn(e.to_string()))?;

        debug!(resource, generation, "resource worker spawned");
        queues.insert(
            resource.to_string(),
            QueueSlot {
                sender: sender.clone(),
                generation,
                join: Some(join),
            },
        );
        Ok((sender, generation))
    }

    /// Remove a slot, but only the generation that asked to be removed; a
    /// racing recreation must not be clobbered.
    fn drop_queue(&self, resource: &str, generation: u64) {
        let mut queues = self.queues.lock();
        if queues.get(resource).is_some_and(|slot| slot.generation == generation) {
            queues.remove(resource);
            debug!(resource, generation, "resource worker removed from directory");
        }
    }
}

/// Non-blocking dispatcher: registers the caller's future, forwards the
/// request to the addressed resource queue, and returns. Never waits on a
/// resource's answer.
pub(crate) struct Router {
    shared: Arc<Shared>,
}

impl Router {
    pub(crate) fn new(
        store: Arc<dyn CommitStore>,
        snapshots: Arc<dyn SnapshotManager>,
        config: EngineConfig,
    ) -> Self {
        Router {
            shared: Arc::new(Shared {
                store,
                snapshots,
                config,
                correlator: Arc::new(Correlator::new()),
                queues: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn post(
        &self,
        resource: &str,
        previous: CommitId,
        commits: Vec<Commit>,
    ) -> ResponseFuture<PostOutcome> {
        let (request, future) = self.shared.correlator.register_post();
        self.dispatch(resource, QueueRequest::Post { request, previous, commits });
        future
    }

    pub(crate) fn get(&self, resource: &str, from: CommitId) -> ResponseFuture<GetOutcome> {
        let (request, future) = self.shared.correlator.register_get();
        self.dispatch(resource, QueueRequest::Get { request, from });
        future
    }

    fn dispatch(&self, resource: &str, mut request: QueueRequest) {
        if self.shared.closed.load(Ordering::SeqCst) {
            self.shared.correlator.fail(request.request_id(), SyncError::Closed);
            return;
        }

        for _ in 0..DISPATCH_ATTEMPTS {
            let (sender, generation) = match self.shared.ensure_queue(resource) {
                Ok(pair) => pair,
                Err(e) => {
                    self.shared.correlator.fail(request.request_id(), e);
                    return;
                }
            };

            match sender.try_send(request) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    warn!(resource, "resource queue full, rejecting request");
                    self.shared.correlator.fail(
                        returned.request_id(),
                        SyncError::QueueFull { resource: resource.to_string() },
                    );
                    return;
                }
                Err(TrySendError::Disconnected(returned)) => {
                    // The worker exited between lookup and send; retire the
                    // stale slot and retry against a fresh one.
                    request = returned;
                    self.shared.drop_queue(resource, generation);
                }
            }
        }

        // A freshly spawned worker died out from under us repeatedly.
        self.shared.correlator.fail(request.request_id(), SyncError::Terminated);
    }

    /// Shut down every resource worker, wait for their mailboxes to drain,
    /// and fail whatever is still unanswered.
    pub(crate) fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let slots: Vec<QueueSlot> = {
            let mut queues = self.shared.queues.lock();
            queues.drain().map(|(_, slot)| slot).collect()
        };
        for mut slot in slots {
            let join = slot.join.take();
            drop(slot);
            if let Some(join) = join {
                let _ = join.join();
            }
        }

        self.shared.correlator.abort_all(SyncError::Closed);
        debug!("router closed");
    }

    #[cfg(test)]
    pub(crate) fn resource_count(&self) -> usize {
        self.shared.queues.lock().len()
    }
}
