//! Cluster plumbing: deployment roles, the shard-dispatch RPC surface and
//! follower replication.

pub mod dispatch;
pub mod followers;
pub mod response;

pub use dispatch::{
    collection_path, document_key_path, document_path, url_encode, RequestMethod, ShardDispatch,
    ShardRequest, ShardResponse, NOLOCK_HEADER,
};
pub use followers::replicate_to_followers;
pub use response::ResponseCode;

/// The role a process plays in the deployment.
///
/// Coordinators route every CRUD operation to shard servers and never touch
/// local data; database servers hold shards and replicate to followers;
/// single servers do neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerRole {
    /// A standalone server.
    #[default]
    Single,
    /// A cluster coordinator.
    Coordinator,
    /// A cluster database (shard) server.
    DbServer,
}

impl ServerRole {
    /// Returns `true` on coordinators.
    #[must_use]
    pub const fn is_coordinator(self) -> bool {
        matches!(self, Self::Coordinator)
    }

    /// Returns `true` on database servers.
    #[must_use]
    pub const fn is_db_server(self) -> bool {
        matches!(self, Self::DbServer)
    }
}
