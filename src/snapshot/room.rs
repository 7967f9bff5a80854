//! Chat-room snapshot: occupancy tracking plus a message feed.

use super::{replay, Snapshot, SnapshotManager, Validity};
use crate::error::Result;
use crate::store::CommitStore;
use crate::types::{Commit, CommitContent, Version};

const JOIN_FEED_MSG: &str = "Joined...";
const LEAVE_FEED_MSG: &str = "Left...";

/// One rendered feed line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomMessage {
    pub user_id: String,
    pub message: String,
}

/// Materialized chat-room state.
///
/// Preconditions enforced: a user joins at most once, and only present
/// users may leave or post.
pub struct RoomSnapshot {
    resource: String,
    version: Version,
    feed: Vec<RoomMessage>,
    occupants: Vec<String>,
}

impl RoomSnapshot {
    pub fn new(resource: impl Into<String>) -> Self {
        RoomSnapshot {
            resource: resource.into(),
            version: Version::initial(),
            feed: Vec::new(),
            occupants: Vec::new(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Users currently in the room.
    pub fn occupants(&self) -> &[String] {
        &self.occupants
    }

    /// The rendered message feed, oldest first.
    pub fn feed(&self) -> &[RoomMessage] {
        &self.feed
    }

    fn is_present(&self, user_id: &str) -> bool {
        self.occupants.iter().any(|u| u == user_id)
    }
}

impl Snapshot for RoomSnapshot {
    fn version(&self) -> Version {
        self.version.clone()
    }

    fn validate(&self, commit: &Commit) -> Validity {
        match &commit.content {
            CommitContent::Join { user_id } => {
                Validity::require(!self.is_present(user_id), "User already joined.")
            }
            CommitContent::Leave { user_id } => {
                Validity::require(self.is_present(user_id), "User already left.")
            }
            CommitContent::Post { user_id, .. } => {
                Validity::require(self.is_present(user_id), "User must be in room to post.")
            }
        }
    }

    fn apply(&mut self, commit: &Commit) {
        let line = match &commit.content {
            CommitContent::Join { user_id } => {
                self.occupants.push(user_id.clone());
                RoomMessage {
                    user_id: user_id.clone(),
                    message: JOIN_FEED_MSG.to_string(),
                }
            }
            CommitContent::Leave { user_id } => {
                self.occupants.retain(|u| u != user_id);
                RoomMessage {
                    user_id: user_id.clone(),
                    message: LEAVE_FEED_MSG.to_string(),
                }
            }
            CommitContent::Post { user_id, message } => RoomMessage {
                user_id: user_id.clone(),
                message: message.clone(),
            },
        };
        self.feed.push(line);
        self.version = self.version.increment(commit.id.clone());
    }
}

/// Rebuilds a [`RoomSnapshot`] by replaying the resource's history.
#[derive(Default)]
pub struct RoomSnapshotManager;

impl RoomSnapshotManager {
    pub fn new() -> Self {
        RoomSnapshotManager
    }
}

impl SnapshotManager for RoomSnapshotManager {
    fn rebuild(&self, resource: &str, store: &dyn CommitStore) -> Result<Box<dyn Snapshot>> {
        let mut snapshot = RoomSnapshot::new(resource);
        replay(&mut snapshot, resource, store)?;
        Ok(Box::new(snapshot))
    }
}
