//! Client-side replica of a session's optimistic writes.
//!
//! Owned, injected state: each client session constructs its own store and
//! threads it to wherever commits are proposed or acknowledged.

use crate::types::{Commit, CommitEntry, CommitId, Version};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Per-session record of commits the client knows about, resource by
/// resource, with their local/cloud acknowledgement flags.
#[derive(Default)]
pub struct ReplicaStore {
    resources: Mutex<HashMap<String, Vec<CommitEntry>>>,
}

impl ReplicaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for the commit's id, marking it
    /// persisted locally.
    pub fn upsert(&self, resource: &str, entry: CommitEntry) {
        let entry = CommitEntry {
            synced_to_local: true,
            ..entry
        };
        let mut resources = self.resources.lock();
        let entries = resources.entry(resource.to_string()).or_default();
        match entries.iter_mut().find(|e| e.commit.id == entry.commit.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Flip a commit to cloud-acknowledged. Returns false if unknown.
    pub fn mark_cloud_synced(&self, resource: &str, id: &CommitId) -> bool {
        let mut resources = self.resources.lock();
        let Some(entries) = resources.get_mut(resource) else {
            return false;
        };
        match entries.iter_mut().find(|e| e.commit.id == *id) {
            Some(entry) => {
                entry.synced_to_cloud = true;
                true
            }
            None => false,
        }
    }

    /// Drop a commit (e.g. one the engine permanently rejected).
    pub fn remove(&self, resource: &str, id: &CommitId) -> bool {
        let mut resources = self.resources.lock();
        let Some(entries) = resources.get_mut(resource) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.commit.id != *id);
        entries.len() != before
    }

    pub fn get(&self, resource: &str, id: &CommitId) -> Option<CommitEntry> {
        self.resources
            .lock()
            .get(resource)
            .and_then(|entries| entries.iter().find(|e| e.commit.id == *id).cloned())
    }

    /// All entries for a resource, in insertion order.
    pub fn entries(&self, resource: &str) -> Vec<CommitEntry> {
        self.resources
            .lock()
            .get(resource)
            .cloned()
            .unwrap_or_default()
    }

    /// Commits not yet acknowledged by the engine, oldest first: the tail a
    /// client re-chains when recovering from `OutOfSync`.
    pub fn unsynced(&self, resource: &str) -> Vec<Commit> {
        self.resources
            .lock()
            .get(resource)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| !e.synced_to_cloud)
                    .map(|e| e.commit.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Version of the newest cloud-acknowledged commit; the predecessor a
    /// client claims on its next post. Initial if nothing is acknowledged.
    pub fn cloud_version(&self, resource: &str) -> Version {
        let resources = self.resources.lock();
        let Some(entries) = resources.get(resource) else {
            return Version::initial();
        };
        let synced: Vec<&CommitEntry> =
            entries.iter().filter(|e| e.synced_to_cloud).collect();
        match synced.last() {
            Some(entry) => Version {
                id: entry.commit.id.clone(),
                sequence: synced.len() as i64 - 1,
            },
            None => Version::initial(),
        }
    }
}
