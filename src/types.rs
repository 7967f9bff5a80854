//! Core types for the synchronization engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel id marking the start of a resource's history.
const INITIAL_ID: &str = "-1";

/// Sequence paired with the initial id.
const INITIAL_SEQUENCE: i64 = -1;

/// Opaque, proposer-assigned identifier of a commit.
///
/// Ids are unique within a resource. The sentinel `CommitId::initial()`
/// denotes "before any commit" and never names a stored commit.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    /// The start-of-history sentinel.
    pub fn initial() -> Self {
        CommitId(INITIAL_ID.to_string())
    }

    /// Whether this is the start-of-history sentinel.
    pub fn is_initial(&self) -> bool {
        self.0 == INITIAL_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitId({})", self.0)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        CommitId(s.to_string())
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        CommitId(s)
    }
}

/// Pointer to a position in a resource's history: the commit id at that
/// position plus its zero-based sequence number.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: CommitId,
    pub sequence: i64,
}

impl Version {
    /// The version before any commit: `("-1", -1)`.
    pub fn initial() -> Self {
        Version {
            id: CommitId::initial(),
            sequence: INITIAL_SEQUENCE,
        }
    }

    /// Whether this version points at the start of history.
    pub fn is_initial(&self) -> bool {
        self.sequence == INITIAL_SEQUENCE
    }

    /// The version one past this one, at `new_id`.
    pub fn increment(&self, new_id: CommitId) -> Version {
        Version {
            id: new_id,
            sequence: self.sequence + 1,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::initial()
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({}, {})", self.id, self.sequence)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.sequence)
    }
}

/// One atomic proposed state transition against a resource.
///
/// Immutable once accepted by the resource's worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub content: CommitContent,
}

impl Commit {
    pub fn new(id: impl Into<CommitId>, content: CommitContent) -> Self {
        Commit {
            id: id.into(),
            content,
        }
    }
}

/// Payload of a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommitContent {
    /// A user enters the resource.
    Join { user_id: String },
    /// A user leaves the resource.
    Leave { user_id: String },
    /// A user posts a message.
    Post { user_id: String, message: String },
}

impl CommitContent {
    /// The user the commit is about.
    pub fn user_id(&self) -> &str {
        match self {
            CommitContent::Join { user_id }
            | CommitContent::Leave { user_id }
            | CommitContent::Post { user_id, .. } => user_id,
        }
    }
}

/// Client-side replica bookkeeping: a commit plus two independent flags
/// tracking an optimistic local write until it is acknowledged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub commit: Commit,
    /// Persisted in the session's local replica.
    pub synced_to_local: bool,
    /// Acknowledged by the authoritative engine.
    pub synced_to_cloud: bool,
}

impl CommitEntry {
    /// A freshly proposed commit, not yet persisted anywhere.
    pub fn pending(commit: Commit) -> Self {
        CommitEntry {
            commit,
            synced_to_local: false,
            synced_to_cloud: false,
        }
    }

    /// A commit already known to the authority (e.g. fetched history).
    pub fn synced(commit: Commit) -> Self {
        CommitEntry {
            commit,
            synced_to_local: true,
            synced_to_cloud: true,
        }
    }
}

/// Terminal answer to a `post_commits` request.
///
/// Conflicts are ordinary values: each variant implies a different client
/// recovery action. Infrastructure faults travel as
/// [`SyncError`](crate::SyncError) instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostOutcome {
    /// Every submitted commit was accepted, in order.
    Acks {
        acked: Vec<CommitId>,
        latest: Version,
    },
    /// The claimed predecessor never existed; the client must discard
    /// unsynced local state and resync from the initial version.
    SequenceBroken { latest: Version },
    /// The claimed predecessor exists but is no longer the head; the client
    /// should fetch recent history and re-chain. No data loss.
    OutOfSync { latest: Version },
    /// A proposed commit id is already present; treat it as already applied
    /// and do not retry verbatim. `acked` holds the prefix accepted before
    /// the duplicate.
    InvalidCommitId {
        id: CommitId,
        acked: Vec<CommitId>,
        latest: Version,
    },
    /// A commit violates a domain precondition; permanently rejected.
    /// `acked` holds the prefix accepted before the rejection.
    InvalidState {
        id: CommitId,
        reason: String,
        acked: Vec<CommitId>,
        latest: Version,
    },
}

/// Terminal answer to a `get_commits` request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GetOutcome {
    /// All commits strictly after `previous`, oldest first.
    Commits {
        commits: Vec<Commit>,
        previous: Version,
    },
    /// The requested starting id never existed.
    SequenceBroken { latest: Version },
}
