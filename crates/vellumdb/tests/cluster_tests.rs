//! Integration tests for the coordinator pipeline and follower replication.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use vellumdb::cluster::{
    RequestMethod, ResponseCode, ServerRole, ShardDispatch, ShardRequest, ShardResponse,
    NOLOCK_HEADER,
};
use vellumdb::transaction::{Transaction, TransactionContext};
use vellumdb::{
    AccessType, CollectionType, Database, ErrorCode, OperationOptions, Result, Value,
};

/// A scriptable stand-in for the wire-level shard client.
#[derive(Default)]
struct MockDispatch {
    /// Responses popped in order by `send`.
    routed: Mutex<VecDeque<ShardResponse>>,
    /// Requests `send` received.
    sent: Mutex<Vec<ShardRequest>>,
    /// Fixed response per server for `send_to_server`.
    per_server: Mutex<HashMap<String, ShardResponse>>,
    /// Requests `send_to_server` received.
    server_sent: Mutex<Vec<(String, ShardRequest)>>,
}

impl MockDispatch {
    fn push_response(&self, response: ShardResponse) {
        self.routed.lock().push_back(response);
    }

    fn set_server_response(&self, server: &str, response: ShardResponse) {
        self.per_server.lock().insert(server.to_string(), response);
    }

    fn last_sent(&self) -> ShardRequest {
        self.sent.lock().last().cloned().expect("a request was sent")
    }
}

impl ShardDispatch for MockDispatch {
    fn send(&self, request: ShardRequest) -> Result<ShardResponse> {
        self.sent.lock().push(request);
        Ok(self
            .routed
            .lock()
            .pop_front()
            .unwrap_or_else(|| ShardResponse::new(ResponseCode::ServerError, "")))
    }

    fn send_to_server(&self, server: &str, request: ShardRequest) -> Result<ShardResponse> {
        self.server_sent.lock().push((server.to_string(), request));
        Ok(self
            .per_server
            .lock()
            .get(server)
            .cloned()
            .unwrap_or_else(|| ShardResponse::new(ResponseCode::Accepted, "")))
    }
}

fn coordinator() -> (Database, Arc<MockDispatch>, Transaction) {
    let db = Database::new("_system", ServerRole::Coordinator);
    db.create_collection("users", CollectionType::Document).expect("create plan view");
    let dispatch = Arc::new(MockDispatch::default());
    db.set_dispatch(Arc::<MockDispatch>::clone(&dispatch));

    let mut trx = Transaction::new(TransactionContext::standalone(db.clone()));
    trx.begin().expect("begin");
    (db, dispatch, trx)
}

fn identity_body() -> String {
    r#"{"_id":"users/abc","_key":"abc","_rev":"R1"}"#.to_string()
}

// ============================================================================
// Coordinator: insert
// ============================================================================

#[test]
fn test_coordinator_insert_created_sets_wait_for_sync() {
    let (_db, dispatch, mut trx) = coordinator();
    dispatch.push_response(ShardResponse::new(ResponseCode::Created, identity_body()));

    let doc = Value::object([("_key", Value::from("abc"))]);
    let result = trx.insert("users", &doc, &OperationOptions::new()).expect("insert");

    assert!(result.is_ok());
    assert!(result.wait_for_sync);
    let payload = result.payload.expect("payload");
    assert_eq!(payload.get("_key").and_then(Value::as_str), Some("abc"));

    let request = dispatch.last_sent();
    assert_eq!(request.method, RequestMethod::Post);
    assert_eq!(request.path, "/_db/_system/_api/document/users");
    assert!(request.body.is_some());
}

#[test]
fn test_coordinator_insert_accepted_is_unsynced_success() {
    let (_db, dispatch, mut trx) = coordinator();
    dispatch.push_response(ShardResponse::new(ResponseCode::Accepted, identity_body()));

    let doc = Value::object([("_key", Value::from("abc"))]);
    let result = trx.insert("users", &doc, &OperationOptions::new()).expect("insert");
    assert!(result.is_ok());
    assert!(!result.wait_for_sync);
}

#[test]
fn test_coordinator_insert_status_mapping() {
    let cases = [
        (ResponseCode::Conflict, ErrorCode::UniqueConstraintViolated),
        (ResponseCode::PreconditionFailed, ErrorCode::Conflict),
        (ResponseCode::NotFound, ErrorCode::CollectionNotFound),
        (ResponseCode::ServerError, ErrorCode::Internal),
    ];
    for (response, expected) in cases {
        let (_db, dispatch, mut trx) = coordinator();
        dispatch.push_response(ShardResponse::new(response, ""));
        let doc = Value::object([("_key", Value::from("abc"))]);
        let result = trx.insert("users", &doc, &OperationOptions::new()).expect("insert");
        assert_eq!(result.code, expected);
    }
}

#[test]
fn test_coordinator_insert_bad_parses_error_body() {
    let (_db, dispatch, mut trx) = coordinator();
    let body = format!(
        r#"{{"error":true,"errorNum":{},"errorMessage":"bad key"}}"#,
        ErrorCode::DocumentKeyBad.num()
    );
    dispatch.push_response(ShardResponse::new(ResponseCode::Bad, body));

    let doc = Value::object([("_key", Value::from("abc"))]);
    let result = trx.insert("users", &doc, &OperationOptions::new()).expect("insert");
    assert_eq!(result.code, ErrorCode::DocumentKeyBad);
    assert_eq!(result.message.as_deref(), Some("bad key"));
}

#[test]
fn test_coordinator_unparseable_body_is_internal() {
    let (_db, dispatch, mut trx) = coordinator();
    dispatch.push_response(ShardResponse::new(ResponseCode::Created, "{not json"));

    let doc = Value::object([("_key", Value::from("abc"))]);
    let result = trx.insert("users", &doc, &OperationOptions::new()).expect("insert");
    assert_eq!(result.code, ErrorCode::Internal);
    assert!(result.message.as_deref().is_some_and(|m| m.contains("{not json")));
}

#[test]
fn test_coordinator_array_input_not_implemented() {
    let (_db, _dispatch, mut trx) = coordinator();
    let batch = Value::Array(vec![Value::object([("_key", Value::from("a"))])]);
    let err = trx.insert("users", &batch, &OperationOptions::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);
}

// ============================================================================
// Coordinator: document
// ============================================================================

#[test]
fn test_coordinator_document_ok_and_precondition() {
    let (_db, dispatch, trx) = coordinator();
    dispatch.push_response(ShardResponse::new(ResponseCode::Ok, identity_body()));

    let request = Value::object([("_key", Value::from("abc"))]);
    let result = trx.document("users", &request, &OperationOptions::new()).expect("document");
    assert!(result.is_ok());
    assert!(result.payload.is_some());

    // A failed precondition still parses the body so the caller sees the
    // stored revision.
    dispatch.push_response(ShardResponse::new(ResponseCode::PreconditionFailed, identity_body()));
    let conditional = Value::object([
        ("_key", Value::from("abc")),
        ("_rev", Value::from("R0")),
    ]);
    let result = trx.document("users", &conditional, &OperationOptions::new()).expect("document");
    assert_eq!(result.code, ErrorCode::Conflict);
    let payload = result.payload.expect("payload");
    assert_eq!(payload.get("_rev").and_then(Value::as_str), Some("R1"));

    // The expected revision travelled as a conditional header.
    let sent = dispatch.last_sent();
    assert_eq!(sent.headers.get("if-match").map(String::as_str), Some("R0"));
}

#[test]
fn test_coordinator_document_not_found_and_bad_key() {
    let (_db, dispatch, trx) = coordinator();
    dispatch.push_response(ShardResponse::new(ResponseCode::NotFound, ""));

    let request = Value::object([("_key", Value::from("abc"))]);
    let result = trx.document("users", &request, &OperationOptions::new()).expect("document");
    assert_eq!(result.code, ErrorCode::DocumentNotFound);

    // A missing key never reaches the wire.
    let result = trx
        .document("users", &Value::object([("x", Value::from(1i64))]), &OperationOptions::new())
        .expect("document");
    assert_eq!(result.code, ErrorCode::DocumentKeyBad);
    assert_eq!(dispatch.sent.lock().len(), 1);
}

// ============================================================================
// Coordinator: update / replace / remove
// ============================================================================

#[test]
fn test_coordinator_modify_fall_through_mapping() {
    // 409 maps to unique-constraint-violated, 412 to revision conflict, and
    // both still parse the response body.
    let cases = [
        (ResponseCode::Conflict, ErrorCode::UniqueConstraintViolated),
        (ResponseCode::PreconditionFailed, ErrorCode::Conflict),
        (ResponseCode::Accepted, ErrorCode::NoError),
        (ResponseCode::Created, ErrorCode::NoError),
    ];
    for (response, expected) in cases {
        let (_db, dispatch, mut trx) = coordinator();
        dispatch.push_response(ShardResponse::new(response, identity_body()));

        let patch = Value::object([("_key", Value::from("abc")), ("age", Value::from(1i64))]);
        let result = trx.update("users", &patch, &OperationOptions::new()).expect("update");
        assert_eq!(result.code, expected);
        assert!(result.payload.is_some());
        assert_eq!(result.wait_for_sync, response == ResponseCode::Created);

        let sent = dispatch.last_sent();
        assert_eq!(sent.method, RequestMethod::Patch);
        assert_eq!(sent.path, "/_db/_system/_api/document/users/abc");
    }
}

#[test]
fn test_coordinator_replace_uses_put() {
    let (_db, dispatch, mut trx) = coordinator();
    dispatch.push_response(ShardResponse::new(ResponseCode::Accepted, identity_body()));

    let replacement = Value::object([("_key", Value::from("abc"))]);
    trx.replace("users", &replacement, &OperationOptions::new()).expect("replace");
    assert_eq!(dispatch.last_sent().method, RequestMethod::Put);
}

#[test]
fn test_coordinator_remove_wait_for_sync_mapping() {
    // 200 means the removal was synced, 202 means it was not.
    for (response, synced) in [(ResponseCode::Ok, true), (ResponseCode::Accepted, false)] {
        let (_db, dispatch, mut trx) = coordinator();
        dispatch.push_response(ShardResponse::new(response, identity_body()));

        let request = Value::object([("_key", Value::from("abc"))]);
        let result = trx.remove("users", &request, &OperationOptions::new()).expect("remove");
        assert!(result.is_ok());
        assert_eq!(result.wait_for_sync, synced);
        assert_eq!(dispatch.last_sent().method, RequestMethod::Delete);
    }
}

// ============================================================================
// Coordinator: option flags and the no-lock header
// ============================================================================

#[test]
fn test_coordinator_appends_option_flags() {
    let (_db, dispatch, mut trx) = coordinator();
    dispatch.push_response(ShardResponse::new(ResponseCode::Created, identity_body()));

    let mut options = OperationOptions::new();
    options.wait_for_sync = true;
    options.return_new = true;
    let doc = Value::object([("_key", Value::from("abc"))]);
    trx.insert("users", &doc, &options).expect("insert");

    let query = dispatch.last_sent().query;
    let get = |name: &str| query.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone());
    assert_eq!(get("waitForSync").as_deref(), Some("true"));
    assert_eq!(get("returnNew").as_deref(), Some("true"));
    assert_eq!(get("returnOld").as_deref(), Some("false"));
}

#[test]
fn test_nolock_header_injection() {
    let (_db, dispatch, mut trx) = coordinator();
    dispatch.push_response(ShardResponse::new(ResponseCode::Created, identity_body()));

    trx.set_nolock_shards(HashSet::from(["s2".to_string(), "s1".to_string()]));
    let doc = Value::object([("_key", Value::from("abc"))]);
    trx.insert("users", &doc, &OperationOptions::new()).expect("insert");
    assert_eq!(
        dispatch.last_sent().headers.get(NOLOCK_HEADER).map(String::as_str),
        Some("s1;s2")
    );

    // Cleared on return from the dispatch path.
    dispatch.push_response(ShardResponse::new(ResponseCode::Created, identity_body()));
    trx.clear_nolock_shards();
    trx.insert("users", &doc, &OperationOptions::new()).expect("insert");
    assert!(dispatch.last_sent().headers.get(NOLOCK_HEADER).is_none());
}

// ============================================================================
// Coordinator: refused operations
// ============================================================================

#[test]
fn test_coordinator_refuses_index_scans_and_scans() {
    let (_db, _dispatch, trx) = coordinator();

    let err = trx
        .index_scan("users", vellumdb::CursorType::All, None, None, 0, 10, 100, false)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::OnlyOnDbServer);

    let err = trx.all("users", 0, 10, &OperationOptions::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);
    let err = trx.any("users").unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);
    let err = trx
        .all_keys("users", vellumdb::KeysType::Key, &OperationOptions::new())
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);
}

#[test]
fn test_coordinator_count_and_truncate() {
    let (_db, dispatch, mut trx) = coordinator();
    dispatch.push_response(ShardResponse::new(ResponseCode::Ok, r#"{"count":42}"#));
    let result = trx.count("users").expect("count");
    assert_eq!(result.payload, Some(Value::Int(42)));

    dispatch.push_response(ShardResponse::new(ResponseCode::Ok, "true"));
    let result = trx.truncate("users", &OperationOptions::new()).expect("truncate");
    assert!(result.is_ok());
    assert_eq!(
        dispatch.last_sent().path,
        "/_db/_system/_api/collection/users/truncate"
    );
}

// ============================================================================
// Follower replication
// ============================================================================

fn shard_leader() -> (Database, Arc<MockDispatch>) {
    let db = Database::new("_system", ServerRole::DbServer);
    db.create_collection("users", CollectionType::Document).expect("create");
    let dispatch = Arc::new(MockDispatch::default());
    db.set_dispatch(Arc::<MockDispatch>::clone(&dispatch));
    (db, dispatch)
}

fn leader_transaction(db: &Database) -> Transaction {
    let users = db.collection("users").expect("users");
    let mut trx = Transaction::new(TransactionContext::standalone(db.clone()));
    trx.add_collection(users.id(), AccessType::Write).expect("add collection");
    trx.begin().expect("begin");
    trx
}

#[test]
fn test_follower_demotion_on_failed_replication() {
    let (db, dispatch) = shard_leader();
    let users = db.collection("users").expect("users");
    users.followers().add("F1");
    users.followers().add("F2");
    dispatch.set_server_response("F1", ShardResponse::new(ResponseCode::Created, "true"));
    dispatch.set_server_response("F2", ShardResponse::new(ResponseCode::ServerError, ""));

    let mut trx = leader_transaction(&db);
    let mut options = OperationOptions::new();
    options.wait_for_sync = true;
    let doc = Value::object([("_key", Value::from("abc"))]);
    let result = trx.insert("users", &doc, &options).expect("insert");

    // A failing follower never fails the primary write.
    assert!(result.is_ok());
    assert!(result.wait_for_sync);
    assert_eq!(users.size(), 1);

    // F2 disagreed and was demoted; F1 stays.
    assert_eq!(users.followers().get(), vec!["F1".to_string()]);

    // Both followers received the same body the caller passed in.
    let sent = dispatch.server_sent.lock();
    assert_eq!(sent.len(), 2);
    for (_, request) in sent.iter() {
        assert_eq!(request.path, "/_db/_system/_api/document/users");
        assert!(request.body.as_deref().is_some_and(|b| b.contains("abc")));
    }
}

#[test]
fn test_replication_covers_update_and_remove() {
    let (db, dispatch) = shard_leader();
    let users = db.collection("users").expect("users");
    users.followers().add("F1");

    let mut trx = leader_transaction(&db);
    let doc = Value::object([("_key", Value::from("abc"))]);
    trx.insert("users", &doc, &OperationOptions::new()).expect("insert");

    let patch = Value::object([("_key", Value::from("abc")), ("age", Value::from(1i64))]);
    trx.update("users", &patch, &OperationOptions::new()).expect("update");
    trx.remove("users", &doc, &OperationOptions::new()).expect("remove");

    let methods: Vec<RequestMethod> =
        dispatch.server_sent.lock().iter().map(|(_, r)| r.method).collect();
    assert_eq!(
        methods,
        vec![RequestMethod::Post, RequestMethod::Patch, RequestMethod::Delete]
    );
    // All acknowledgements were positive, so the follower set is unchanged.
    assert_eq!(users.followers().get(), vec!["F1".to_string()]);
}

#[test]
fn test_replication_timeout_budget_is_applied() {
    let (db, dispatch) = shard_leader();
    let users = db.collection("users").expect("users");
    users.followers().add("F1");

    let mut trx = leader_transaction(&db);
    let doc = Value::object([("_key", Value::from("abc"))]);
    trx.insert("users", &doc, &OperationOptions::new()).expect("insert");

    let sent = dispatch.server_sent.lock();
    let (_, request) = sent.first().expect("replicated request");
    assert_eq!(request.timeout, db.config().replication_timeout);
}
