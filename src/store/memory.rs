//! In-memory commit store.

use super::CommitStore;
use crate::error::{Result, SyncError};
use crate::types::{Commit, CommitId, Version};
use parking_lot::RwLock;
use std::collections::HashMap;

/// One resource's ordered history plus an id index.
#[derive(Default)]
struct ResourceLog {
    commits: Vec<Commit>,
    by_id: HashMap<CommitId, usize>,
}

impl ResourceLog {
    fn latest_version(&self) -> Version {
        match self.commits.last() {
            Some(commit) => Version {
                id: commit.id.clone(),
                sequence: self.commits.len() as i64 - 1,
            },
            None => Version::initial(),
        }
    }
}

/// `CommitStore` backed by process memory.
///
/// The reference implementation for tests and single-process deployments;
/// durability is the concern of whatever store the boundary injects instead.
#[derive(Default)]
pub struct MemoryStore {
    resources: RwLock<HashMap<String, ResourceLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits held for a resource.
    pub fn len(&self, resource: &str) -> usize {
        self.resources
            .read()
            .get(resource)
            .map(|log| log.commits.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, resource: &str) -> bool {
        self.len(resource) == 0
    }
}

impl CommitStore for MemoryStore {
    fn latest_version(&self, resource: &str) -> Result<Version> {
        Ok(self
            .resources
            .read()
            .get(resource)
            .map(ResourceLog::latest_version)
            .unwrap_or_default())
    }

    fn exists(&self, resource: &str, id: &CommitId) -> Result<bool> {
        Ok(self
            .resources
            .read()
            .get(resource)
            .is_some_and(|log| log.by_id.contains_key(id)))
    }

    fn get(&self, resource: &str, id: &CommitId) -> Result<Option<Commit>> {
        Ok(self.resources.read().get(resource).and_then(|log| {
            log.by_id.get(id).map(|&index| log.commits[index].clone())
        }))
    }

    fn commits_after(&self, resource: &str, id: &CommitId) -> Result<Vec<Commit>> {
        let resources = self.resources.read();
        let Some(log) = resources.get(resource) else {
            return Ok(Vec::new());
        };
        let start = if id.is_initial() {
            0
        } else {
            match log.by_id.get(id) {
                Some(&index) => index + 1,
                None => return Ok(Vec::new()),
            }
        };
        Ok(log.commits[start..].to_vec())
    }

    fn sequence_of(&self, resource: &str, id: &CommitId) -> Result<i64> {
        self.resources
            .read()
            .get(resource)
            .and_then(|log| log.by_id.get(id))
            .map(|&index| index as i64)
            .ok_or_else(|| SyncError::UnknownCommit {
                resource: resource.to_string(),
                id: id.clone(),
            })
    }

    fn append(&self, resource: &str, commit: Commit) -> Result<()> {
        let mut resources = self.resources.write();
        let log = resources.entry(resource.to_string()).or_default();
        debug_assert!(!log.by_id.contains_key(&commit.id));
        log.by_id.insert(commit.id.clone(), log.commits.len());
        log.commits.push(commit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommitContent;

    fn join(id: &str, user: &str) -> Commit {
        Commit::new(id, CommitContent::Join { user_id: user.into() })
    }

    #[test]
    fn test_empty_resource() {
        let store = MemoryStore::new();
        assert_eq!(store.latest_version("r").unwrap(), Version::initial());
        assert!(!store.exists("r", &"c1".into()).unwrap());
        assert!(store.commits_after("r", &CommitId::initial()).unwrap().is_empty());
        assert!(store.is_empty("r"));
    }

    #[test]
    fn test_append_and_lookup() {
        let store = MemoryStore::new();
        store.append("r", join("c1", "u1")).unwrap();
        store.append("r", join("c2", "u2")).unwrap();

        let latest = store.latest_version("r").unwrap();
        assert_eq!(latest.id.as_str(), "c2");
        assert_eq!(latest.sequence, 1);

        assert!(store.exists("r", &"c1".into()).unwrap());
        assert_eq!(store.get("r", &"c1".into()).unwrap().unwrap().id.as_str(), "c1");
        assert_eq!(store.sequence_of("r", &"c2".into()).unwrap(), 1);
    }

    #[test]
    fn test_commits_after() {
        let store = MemoryStore::new();
        for id in ["c1", "c2", "c3"] {
            store.append("r", join(id, "u")).unwrap();
        }

        let all = store.commits_after("r", &CommitId::initial()).unwrap();
        assert_eq!(all.len(), 3);

        let tail = store.commits_after("r", &"c1".into()).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].id.as_str(), "c2");

        assert!(store.commits_after("r", &"c3".into()).unwrap().is_empty());
    }

    #[test]
    fn test_sequence_of_missing_id() {
        let store = MemoryStore::new();
        store.append("r", join("c1", "u")).unwrap();
        assert!(matches!(
            store.sequence_of("r", &"ghost".into()),
            Err(SyncError::UnknownCommit { .. })
        ));
    }

    #[test]
    fn test_resources_are_isolated() {
        let store = MemoryStore::new();
        store.append("a", join("c1", "u")).unwrap();

        assert_eq!(store.latest_version("b").unwrap(), Version::initial());
        assert!(!store.exists("b", &"c1".into()).unwrap());
    }
}
