//! Follower replication.
//!
//! On a shard leader, every successful local write is replayed to the
//! current follower set. Followers are independent demotion candidates:
//! a follower that does not acknowledge the write with `202` or `201` is
//! removed from the set and logged. A failing follower never fails the
//! primary write.

use std::sync::Arc;

use tracing::{debug, error, warn};

use vellumdb_core::{to_json_string, OperationOptions, Value};
use vellumdb_storage::DocumentCollection;

use crate::cluster::dispatch::{document_path, RequestMethod, ShardRequest};
use crate::cluster::response::ResponseCode;
use crate::database::Database;

/// Replay a write to the follower set of a shard collection.
///
/// The body sent to followers is the same tagged-tree value passed to the
/// local operation. Replication is unordered across followers.
pub fn replicate_to_followers(
    database: &Database,
    collection: &Arc<DocumentCollection>,
    method: RequestMethod,
    value: &Value,
    options: &OperationOptions,
) {
    let followers = collection.followers().get();
    if followers.is_empty() {
        return;
    }

    let Some(dispatch) = database.dispatch() else {
        warn!(
            collection = collection.name(),
            "replication: no shard dispatch configured, keeping follower set"
        );
        return;
    };

    let body = match to_json_string(value) {
        Ok(body) => body,
        Err(err) => {
            warn!(collection = collection.name(), %err, "replication: body not serializable");
            return;
        }
    };

    let path = document_path(database.name(), collection.name());
    debug!(
        collection = collection.name(),
        followers = followers.len(),
        method = method.as_str(),
        "replicating write to followers"
    );

    for follower in followers {
        let request = ShardRequest::new(
            method,
            path.clone(),
            database.config().replication_timeout,
        )
        .with_operation_options(options)
        .with_body(body.clone());

        let acknowledged = matches!(
            dispatch.send_to_server(&follower, request),
            Ok(response)
                if matches!(response.code, ResponseCode::Accepted | ResponseCode::Created)
        );

        if !acknowledged {
            collection.followers().remove(&follower);
            error!(
                collection = collection.name(),
                follower = follower.as_str(),
                "replication: dropping follower"
            );
        }
    }
}
