//! Follower bookkeeping for shard leaders.

use parking_lot::RwLock;

/// The set of followers tracking a shard leader.
///
/// Followers are independent demotion candidates: a follower that diverges
/// from the leader's writes is removed from the set and must resynchronise
/// before it can rejoin.
#[derive(Debug, Default)]
pub struct FollowerInfo {
    followers: RwLock<Vec<String>>,
}

impl FollowerInfo {
    /// An empty follower set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current follower set.
    #[must_use]
    pub fn get(&self) -> Vec<String> {
        self.followers.read().clone()
    }

    /// Add a follower; duplicates are ignored.
    pub fn add(&self, server: &str) {
        let mut followers = self.followers.write();
        if !followers.iter().any(|f| f == server) {
            followers.push(server.to_string());
        }
    }

    /// Demote a follower. Returns `true` if it was present.
    pub fn remove(&self, server: &str) -> bool {
        let mut followers = self.followers.write();
        let before = followers.len();
        followers.retain(|f| f != server);
        followers.len() != before
    }

    /// Returns `true` if no followers are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.followers.read().is_empty()
    }
}
