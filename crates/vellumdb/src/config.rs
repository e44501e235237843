//! Database configuration.

use std::time::Duration;

/// Tunables of a database handle.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Budget for replaying a write to the follower set.
    pub replication_timeout: Duration,
    /// Budget for a coordinator-to-shard request.
    pub request_timeout: Duration,
    /// Batch size used by the paging CRUD operations (`all`, `allKeys`,
    /// `any`).
    pub cursor_batch_size: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            replication_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(300),
            cursor_batch_size: 1000,
        }
    }
}
