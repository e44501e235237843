//! Integration tests for the local CRUD pipeline.

use std::sync::Arc;

use vellumdb::cluster::ServerRole;
use vellumdb::transaction::{Transaction, TransactionContext};
use vellumdb::{
    AccessType, CollectionType, CursorType, Database, ErrorCode, IndexDescriptor, IndexType,
    KeysType, OperationOptions, Value,
};
use vellumdb_core::{ATTR_ID, ATTR_KEY, ATTR_OLD_REV, ATTR_REV};
use vellumdb_storage::DocumentCollection;

fn test_database() -> (Database, Arc<DocumentCollection>) {
    let db = Database::new("_system", ServerRole::Single);
    let users = db.create_collection("users", CollectionType::Document).expect("create users");
    (db, users)
}

fn write_transaction(db: &Database, collection: &Arc<DocumentCollection>) -> Transaction {
    let mut trx = Transaction::new(TransactionContext::standalone(db.clone()));
    trx.add_collection(collection.id(), AccessType::Write).expect("add collection");
    trx.begin().expect("begin");
    trx
}

fn user(key: &str, name: &str) -> Value {
    Value::object([("_key", Value::from(key)), ("name", Value::from(name))])
}

// ============================================================================
// insert
// ============================================================================

#[test]
fn test_insert_single_returns_identity() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);

    let result = trx.insert("users", &user("alice", "Alice"), &OperationOptions::new()).expect("insert");
    assert!(result.is_ok());

    let identity = result.payload.expect("payload");
    assert_eq!(identity.get(ATTR_ID).and_then(Value::as_str), Some("users/alice"));
    assert_eq!(identity.get(ATTR_KEY).and_then(Value::as_str), Some("alice"));
    assert!(identity.get(ATTR_REV).is_some());

    trx.commit().expect("commit");
    assert_eq!(users.size(), 1);
    // The ditch was released when the operation returned.
    assert_eq!(users.ditch_count(), 0);
}

#[test]
fn test_insert_silent_returns_no_payload() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);

    let mut options = OperationOptions::new();
    options.silent = true;
    let result = trx.insert("users", &user("a", "x"), &options).expect("insert");
    assert!(result.is_ok());
    assert!(result.payload.is_none());
}

#[test]
fn test_insert_return_new() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);

    let mut options = OperationOptions::new();
    options.return_new = true;
    let result = trx.insert("users", &user("a", "Ada"), &options).expect("insert");
    let new = result.payload.expect("payload").get("new").cloned().expect("new");
    assert_eq!(new.get("name").and_then(Value::as_str), Some("Ada"));
}

#[test]
fn test_insert_batch_counts_errors_per_kind() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);

    let batch = Value::Array(vec![
        user("a", "first"),
        user("a", "duplicate"),
        Value::from(7i64),
        user("b", "second"),
        user("a", "duplicate again"),
    ]);
    let result = trx.insert("users", &batch, &OperationOptions::new()).expect("insert");

    // Batches report per-document errors through the counter map.
    assert!(result.is_ok());
    assert_eq!(result.error_counts[&ErrorCode::UniqueConstraintViolated], 2);
    assert_eq!(result.error_counts[&ErrorCode::DocumentTypeInvalid], 1);

    // Sum of counts equals elements minus successes.
    let total_errors: u64 = result.error_counts.values().sum();
    assert_eq!(total_errors, 5 - 2);

    // Failed elements leave an error stub in the result array.
    let payload = result.payload.expect("payload");
    let elements = payload.as_array().expect("array");
    assert_eq!(elements.len(), 5);
    assert_eq!(elements[1].get("error"), Some(&Value::Bool(true)));
    assert_eq!(
        elements[1].get("errorNum").and_then(Value::as_int),
        Some(ErrorCode::UniqueConstraintViolated.num())
    );

    assert_eq!(users.size(), 2);
}

// ============================================================================
// document
// ============================================================================

#[test]
fn test_document_reads_stored_body() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);
    trx.insert("users", &user("a", "Ada"), &OperationOptions::new()).expect("insert");

    let request = Value::object([("_key", Value::from("a"))]);
    let result = trx.document("users", &request, &OperationOptions::new()).expect("document");
    assert!(result.is_ok());
    let body = result.payload.expect("payload");
    assert_eq!(body.get("name").and_then(Value::as_str), Some("Ada"));
}

#[test]
fn test_document_not_found() {
    let (db, users) = test_database();
    let trx = write_transaction(&db, &users);
    let request = Value::object([("_key", Value::from("missing"))]);
    let result = trx.document("users", &request, &OperationOptions::new()).expect("document");
    assert_eq!(result.code, ErrorCode::DocumentNotFound);
}

#[test]
fn test_document_batch_stops_at_first_error() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);
    trx.insert("users", &user("a", "x"), &OperationOptions::new()).expect("insert");

    let request = Value::Array(vec![
        Value::object([("_key", Value::from("a"))]),
        Value::object([("_key", Value::from("missing"))]),
        Value::object([("_key", Value::from("a"))]),
    ]);
    let result = trx.document("users", &request, &OperationOptions::new()).expect("document");
    assert_eq!(result.code, ErrorCode::DocumentNotFound);
    // Only the first element made it into the result.
    let payload = result.payload.expect("payload");
    assert_eq!(payload.as_array().map(|a| a.len()), Some(1));
}

// ============================================================================
// update / replace
// ============================================================================

#[test]
fn test_update_merges_attributes() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);
    trx.insert("users", &user("a", "Ada"), &OperationOptions::new()).expect("insert");

    let patch = Value::object([("_key", Value::from("a")), ("age", Value::from(36i64))]);
    let result = trx.update("users", &patch, &OperationOptions::new()).expect("update");
    assert!(result.is_ok());
    let identity = result.payload.expect("payload");
    assert!(identity.get(ATTR_OLD_REV).is_some());

    let stored = users.read("a").expect("read");
    assert_eq!(stored.body.get("name").and_then(Value::as_str), Some("Ada"));
    assert_eq!(stored.body.get("age").and_then(Value::as_int), Some(36));
}

#[test]
fn test_replace_swaps_body() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);
    trx.insert("users", &user("a", "Ada"), &OperationOptions::new()).expect("insert");

    let replacement = Value::object([("_key", Value::from("a")), ("age", Value::from(1i64))]);
    trx.replace("users", &replacement, &OperationOptions::new()).expect("replace");

    let stored = users.read("a").expect("read");
    assert_eq!(stored.body.get("name"), None);
    assert_eq!(stored.body.get("age").and_then(Value::as_int), Some(1));
}

#[test]
fn test_update_revision_conflict_reports_actual_revision() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);

    let inserted = trx.insert("users", &user("d1", "x"), &OperationOptions::new()).expect("insert");
    let stored_rev = inserted
        .payload
        .expect("payload")
        .get(ATTR_REV)
        .and_then(Value::as_str)
        .expect("revision")
        .to_string();

    // The request carries a stale revision; ignore_revs and silent are off.
    let patch = Value::object([
        ("_key", Value::from("d1")),
        ("_rev", Value::from("stale-revision")),
        ("age", Value::from(1i64)),
    ]);
    let result = trx.update("users", &patch, &OperationOptions::new()).expect("update");

    assert_eq!(result.code, ErrorCode::Conflict);
    let identity = result.payload.expect("payload");
    assert_eq!(identity.get(ATTR_ID).and_then(Value::as_str), Some("users/d1"));
    assert_eq!(identity.get(ATTR_KEY).and_then(Value::as_str), Some("d1"));
    assert_eq!(identity.get(ATTR_REV).and_then(Value::as_str), Some(stored_rev.as_str()));
}

#[test]
fn test_update_ignore_revs_skips_the_check() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);
    trx.insert("users", &user("a", "x"), &OperationOptions::new()).expect("insert");

    let patch = Value::object([
        ("_key", Value::from("a")),
        ("_rev", Value::from("stale-revision")),
        ("age", Value::from(1i64)),
    ]);
    let mut options = OperationOptions::new();
    options.ignore_revs = true;
    let result = trx.update("users", &patch, &options).expect("update");
    assert!(result.is_ok());
}

// ============================================================================
// remove
// ============================================================================

#[test]
fn test_remove_by_object_and_string_handle() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);
    trx.insert("users", &user("a", "x"), &OperationOptions::new()).expect("insert");
    trx.insert("users", &user("b", "y"), &OperationOptions::new()).expect("insert");

    let result = trx
        .remove("users", &Value::object([("_key", Value::from("a"))]), &OperationOptions::new())
        .expect("remove");
    assert!(result.is_ok());

    // A bare handle string works too.
    let result = trx
        .remove("users", &Value::from("users/b"), &OperationOptions::new())
        .expect("remove");
    assert!(result.is_ok());
    assert_eq!(users.size(), 0);
}

#[test]
fn test_remove_return_old() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);
    trx.insert("users", &user("a", "Ada"), &OperationOptions::new()).expect("insert");

    let mut options = OperationOptions::new();
    options.return_old = true;
    let result = trx
        .remove("users", &Value::object([("_key", Value::from("a"))]), &options)
        .expect("remove");
    let old = result.payload.expect("payload").get("old").cloned().expect("old");
    assert_eq!(old.get("name").and_then(Value::as_str), Some("Ada"));
}

// ============================================================================
// truncate
// ============================================================================

#[test]
fn test_truncate_removes_everything() {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);
    for i in 0..20 {
        trx.insert("users", &user(&format!("k{i}"), "x"), &OperationOptions::new())
            .expect("insert");
    }

    let result = trx.truncate("users", &OperationOptions::new()).expect("truncate");
    assert!(result.is_ok());
    assert_eq!(users.size(), 0);
    assert_eq!(users.primary_index().num_entries(), 0);
}

// ============================================================================
// all / allKeys / any / count
// ============================================================================

fn populated(count: usize) -> (Database, Arc<DocumentCollection>, Transaction) {
    let (db, users) = test_database();
    let mut trx = write_transaction(&db, &users);
    for i in 0..count {
        trx.insert("users", &user(&format!("k{i:03}"), "x"), &OperationOptions::new())
            .expect("insert");
    }
    (db, users, trx)
}

#[test]
fn test_all_with_skip_and_limit() {
    let (_db, _users, trx) = populated(10);

    let result = trx.all("users", 0, u64::MAX, &OperationOptions::new()).expect("all");
    let docs = result.payload.expect("payload");
    assert_eq!(docs.as_array().map(|a| a.len()), Some(10));

    let result = trx.all("users", 4, 3, &OperationOptions::new()).expect("all");
    let docs = result.payload.expect("payload");
    let keys: Vec<_> = docs
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|d| d.get(ATTR_KEY).and_then(Value::as_str))
        .collect();
    assert_eq!(keys, vec!["k004", "k005", "k006"]);
}

#[test]
fn test_all_keys_prefixes() {
    let (_db, _users, trx) = populated(1);

    let result = trx.all_keys("users", KeysType::Key, &OperationOptions::new()).expect("keys");
    let documents = result.payload.expect("payload").get("documents").cloned().expect("documents");
    assert_eq!(documents.as_array().expect("array")[0], Value::from("k000"));

    let result = trx.all_keys("users", KeysType::Id, &OperationOptions::new()).expect("keys");
    let documents = result.payload.expect("payload").get("documents").cloned().expect("documents");
    assert_eq!(documents.as_array().expect("array")[0], Value::from("users/k000"));

    let result = trx.all_keys("users", KeysType::Path, &OperationOptions::new()).expect("keys");
    let documents = result.payload.expect("payload").get("documents").cloned().expect("documents");
    assert_eq!(
        documents.as_array().expect("array")[0],
        Value::from("/_db/_system/_api/document/users/k000")
    );
}

#[test]
fn test_any_returns_one_document() {
    let (_db, _users, trx) = populated(10);
    let result = trx.any("users").expect("any");
    let docs = result.payload.expect("payload");
    assert_eq!(docs.as_array().map(|a| a.len()), Some(1));
}

#[test]
fn test_count() {
    let (_db, _users, trx) = populated(7);
    let result = trx.count("users").expect("count");
    assert_eq!(result.payload, Some(Value::Int(7)));
}

// ============================================================================
// Cursor factory
// ============================================================================

#[test]
fn test_index_scan_zero_limit_is_empty_success() {
    let (_db, _users, trx) = populated(5);
    let cursor = trx
        .index_scan("users", CursorType::All, None, None, 0, 0, 1000, false)
        .expect("scan");
    assert!(!cursor.has_more());
    assert!(!cursor.failed_to_build());
}

#[test]
fn test_index_scan_requires_handle_for_index_kind() {
    let (_db, _users, trx) = populated(5);
    let err = trx
        .index_scan("users", CursorType::Index, None, None, 0, 10, 1000, false)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::BadParameter);
}

#[test]
fn test_index_scan_over_secondary_index() {
    let (db, users) = test_database();
    users
        .create_index(IndexDescriptor::secondary(
            vellumdb_core::IndexId::new(2),
            IndexType::Skiplist,
            &["name"],
        ))
        .expect("create index");

    let mut trx = write_transaction(&db, &users);
    for (key, name) in [("a", "x"), ("b", "y"), ("c", "x")] {
        trx.insert("users", &user(key, name), &OperationOptions::new()).expect("insert");
    }

    let handle = trx.get_index_by_identifier("users", "2").expect("handle");
    let search = Value::Array(vec![Value::from("x")]);
    let mut cursor = trx
        .index_scan("users", CursorType::Index, Some(&handle), Some(&search), 0, u64::MAX, 10, false)
        .expect("scan");

    let mut keys = Vec::new();
    while cursor.has_more() {
        let batch = cursor.get_more();
        for doc in batch.payload.and_then(|p| p.as_array().map(<[Value]>::to_vec)).unwrap_or_default() {
            keys.push(doc.get(ATTR_KEY).and_then(Value::as_str).expect("key").to_string());
        }
    }
    keys.sort();
    assert_eq!(keys, vec!["a".to_string(), "c".to_string()]);
}

// ============================================================================
// Index handle lookup
// ============================================================================

#[test]
fn test_get_index_by_identifier() {
    let (db, users) = test_database();
    users
        .create_index(IndexDescriptor::secondary(
            vellumdb_core::IndexId::new(7),
            IndexType::Hash,
            &["name"],
        ))
        .expect("create index");
    let trx = write_transaction(&db, &users);

    let handle = trx.get_index_by_identifier("users", "7").expect("handle");
    assert_eq!(handle.index().index_type(), IndexType::Hash);

    let err = trx.get_index_by_identifier("users", "").unwrap_err();
    assert_eq!(err.code, ErrorCode::BadParameter);
    let err = trx.get_index_by_identifier("users", "x7").unwrap_err();
    assert_eq!(err.code, ErrorCode::IndexHandleBad);
    let err = trx.get_index_by_identifier("users", "99").unwrap_err();
    assert_eq!(err.code, ErrorCode::IndexNotFound);
}

#[test]
fn test_edge_index_handle() {
    let (db, users) = test_database();
    db.create_collection("edges", CollectionType::Edge).expect("create edges");
    let trx = write_transaction(&db, &users);

    let handle = trx.edge_index_handle("edges").expect("edge index");
    assert_eq!(handle.index().index_type(), IndexType::Edge);

    let err = trx.edge_index_handle("users").unwrap_err();
    assert_eq!(err.code, ErrorCode::CollectionTypeInvalid);
}

// ============================================================================
// invoke_on_all_elements
// ============================================================================

#[test]
fn test_invoke_on_all_elements_stops_on_false() {
    let (_db, _users, trx) = populated(10);
    let mut seen = 0;
    trx.invoke_on_all_elements("users", |_key| {
        seen += 1;
        seen < 4
    })
    .expect("invoke");
    assert_eq!(seen, 4);
}
