//! The local CRUD pipeline.
//!
//! Every operation follows the same shape: resolve the collection at
//! runtime, order a ditch, take the collection lock, work per document,
//! release the lock. Batch inputs collect per-document errors; on a shard
//! leader, successful writes are replayed to the follower set.

use std::collections::HashMap;
use std::sync::Arc;

use vellumdb_core::{
    build_document_identity, extract_key, CollectionId, ErrorCode, OperationOptions, Result,
    Value, ATTR_KEY,
};
use vellumdb_storage::{expected_revision, AccessType, DocumentCollection, WriteError};

use crate::cluster::{replicate_to_followers, RequestMethod};
use crate::cursor::CursorType;
use crate::transaction::result::{push_batch_error, OperationResult};
use crate::transaction::Transaction;

/// Collects per-document result values and assembles the final payload: a
/// bare value for single-document input, an array for batch input.
struct ResultCollector {
    values: Vec<Value>,
    is_batch: bool,
}

impl ResultCollector {
    fn new(is_batch: bool) -> Self {
        Self { values: Vec::new(), is_batch }
    }

    fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    fn into_payload(mut self) -> Option<Value> {
        if self.is_batch {
            Some(Value::Array(self.values))
        } else {
            self.values.pop()
        }
    }
}

impl Transaction {
    fn prepare_collection(&self, name: &str) -> Result<(CollectionId, Arc<DocumentCollection>)> {
        let cid = self.add_collection_at_runtime(name)?;
        let collection = self.document_collection(cid)?;
        Ok((cid, collection))
    }

    /// Upgrade the runtime registration of a collection to write access.
    fn promote_to_write(&self, cid: CollectionId) -> Result<()> {
        let state = self.state()?;
        let mut state = state.lock();
        if state.collection(cid).is_some_and(|b| b.access == AccessType::Write) {
            return Ok(());
        }
        let collection = self.database().collection_by_id(cid);
        state.add_collection(cid, AccessType::Write, collection, true)
    }

    /// Report the current document identity after a revision conflict.
    fn conflict_identity(
        &self,
        results: &mut ResultCollector,
        cid: CollectionId,
        key: &str,
        err: &WriteError,
        options: &OperationOptions,
    ) -> Result<()> {
        if options.silent {
            return Ok(());
        }
        let Some(actual) = &err.actual_revision else {
            return Ok(());
        };
        let old = if options.return_old { err.old.as_ref() } else { None };
        results.push(build_document_identity(self.resolver(), cid, key, actual, None, old, None)?);
        Ok(())
    }

    // ------------------------------------------------------------------
    // document
    // ------------------------------------------------------------------

    fn read_one(
        &self,
        collection: &DocumentCollection,
        cid: CollectionId,
        value: &Value,
        options: &OperationOptions,
        results: &mut ResultCollector,
    ) -> Result<ErrorCode> {
        let key = extract_key(value);
        if key.is_empty() {
            return Ok(ErrorCode::DocumentHandleBad);
        }
        let expected = expected_revision(value, options);

        let stored = match collection.read(&key) {
            Ok(stored) => stored,
            Err(err) => return Ok(err.code),
        };

        if let Some(expected) = &expected {
            if expected != &stored.revision {
                // Still report the identity so the caller sees the actual
                // revision.
                results.push(build_document_identity(
                    self.resolver(),
                    cid,
                    &key,
                    &stored.revision,
                    None,
                    None,
                    None,
                )?);
                return Ok(ErrorCode::Conflict);
            }
        }

        if !options.silent {
            results.push(stored.body);
        }
        Ok(ErrorCode::NoError)
    }

    pub(crate) fn document_local(
        &self,
        collection_name: &str,
        value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        let (cid, collection) = self.prepare_collection(collection_name)?;
        let _ditch = self.order_ditch(cid)?;

        if let Err(err) = self.lock(cid, AccessType::Read) {
            return Ok(OperationResult::from_code(err.code));
        }

        let mut results = ResultCollector::new(value.is_array());
        let mut code = ErrorCode::NoError;
        if let Some(batch) = value.as_array() {
            for element in batch {
                code = self.read_one(&collection, cid, element, options, &mut results)?;
                if code.is_error() {
                    break;
                }
            }
        } else {
            code = self.read_one(&collection, cid, value, options, &mut results)?;
        }

        self.unlock(cid, AccessType::Read)?;
        Ok(OperationResult::with_payload(results.into_payload(), code, options.wait_for_sync))
    }

    // ------------------------------------------------------------------
    // insert
    // ------------------------------------------------------------------

    fn insert_one(
        &self,
        collection: &DocumentCollection,
        cid: CollectionId,
        value: &Value,
        options: &OperationOptions,
        results: &mut ResultCollector,
    ) -> Result<ErrorCode> {
        if !value.is_object() {
            return Ok(ErrorCode::DocumentTypeInvalid);
        }
        let write = match collection.insert(value) {
            Ok(write) => write,
            Err(err) => return Ok(err.code),
        };
        if options.silent {
            return Ok(ErrorCode::NoError);
        }
        let new = options.return_new.then_some(&write.new);
        results.push(build_document_identity(
            self.resolver(),
            cid,
            &write.key,
            &write.revision,
            None,
            None,
            new,
        )?);
        Ok(ErrorCode::NoError)
    }

    pub(crate) fn insert_local(
        &mut self,
        collection_name: &str,
        value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        let (cid, collection) = self.prepare_collection(collection_name)?;
        self.promote_to_write(cid)?;
        let _ditch = self.order_ditch(cid)?;

        if let Err(err) = self.lock(cid, AccessType::Write) {
            return Ok(OperationResult::from_code(err.code));
        }

        let mut results = ResultCollector::new(value.is_array());
        let mut error_counts = HashMap::new();
        let mut code = ErrorCode::NoError;
        if let Some(batch) = value.as_array() {
            for element in batch {
                let element_code = self.insert_one(&collection, cid, element, options, &mut results)?;
                if element_code.is_error() {
                    push_batch_error(&mut results.values, &mut error_counts, element_code);
                }
            }
            // With batches, reporting happens through the counter map.
        } else {
            code = self.insert_one(&collection, cid, value, options, &mut results)?;
        }

        if self.database().role().is_db_server() && !code.is_error() {
            replicate_to_followers(
                self.database(),
                &collection,
                RequestMethod::Post,
                value,
                options,
            );
        }

        self.unlock(cid, AccessType::Write)?;
        if code.is_error() {
            self.register_failed_operation();
        }
        Ok(OperationResult::with_counters(
            results.into_payload(),
            code,
            options.wait_for_sync,
            error_counts,
        ))
    }

    // ------------------------------------------------------------------
    // update / replace
    // ------------------------------------------------------------------

    fn modify_one(
        &self,
        collection: &DocumentCollection,
        cid: CollectionId,
        new_value: &Value,
        options: &OperationOptions,
        is_patch: bool,
        results: &mut ResultCollector,
    ) -> Result<ErrorCode> {
        if !new_value.is_object() {
            return Ok(ErrorCode::DocumentTypeInvalid);
        }
        let expected = expected_revision(new_value, options);
        let outcome = if is_patch {
            collection.update(new_value, expected.as_ref(), options.keep_null)
        } else {
            collection.replace(new_value, expected.as_ref())
        };

        let write = match outcome {
            Ok(write) => write,
            Err(err) if err.code == ErrorCode::Conflict => {
                let key = extract_key(new_value);
                self.conflict_identity(results, cid, &key, &err, options)?;
                return Ok(ErrorCode::Conflict);
            }
            Err(err) => return Ok(err.code),
        };

        if !options.silent {
            let old = if options.return_old { write.old.as_ref() } else { None };
            let new = options.return_new.then_some(&write.new);
            results.push(build_document_identity(
                self.resolver(),
                cid,
                &write.key,
                &write.revision,
                write.old_revision.as_ref(),
                old,
                new,
            )?);
        }
        Ok(ErrorCode::NoError)
    }

    pub(crate) fn modify_local(
        &mut self,
        collection_name: &str,
        new_value: &Value,
        options: &OperationOptions,
        is_patch: bool,
    ) -> Result<OperationResult> {
        let (cid, collection) = self.prepare_collection(collection_name)?;
        self.promote_to_write(cid)?;
        let _ditch = self.order_ditch(cid)?;

        // Update/replace are a read plus a write; take the write lock for
        // the whole pass.
        if let Err(err) = self.lock(cid, AccessType::Write) {
            return Ok(OperationResult::from_code(err.code));
        }

        let mut results = ResultCollector::new(new_value.is_array());
        let mut code = ErrorCode::NoError;
        if let Some(batch) = new_value.as_array() {
            for element in batch {
                code = self.modify_one(&collection, cid, element, options, is_patch, &mut results)?;
                if code.is_error() {
                    break;
                }
            }
        } else {
            code = self.modify_one(&collection, cid, new_value, options, is_patch, &mut results)?;
        }

        if self.database().role().is_db_server() && !code.is_error() {
            let method = if is_patch { RequestMethod::Patch } else { RequestMethod::Put };
            replicate_to_followers(self.database(), &collection, method, new_value, options);
        }

        self.unlock(cid, AccessType::Write)?;
        if code.is_error() {
            self.register_failed_operation();
        }
        Ok(OperationResult::with_payload(results.into_payload(), code, options.wait_for_sync))
    }

    // ------------------------------------------------------------------
    // remove
    // ------------------------------------------------------------------

    fn remove_one(
        &self,
        collection: &DocumentCollection,
        cid: CollectionId,
        value: &Value,
        options: &OperationOptions,
        results: &mut ResultCollector,
    ) -> Result<ErrorCode> {
        let (key, expected) = match value {
            Value::String(handle) => {
                let key = match handle.find('/') {
                    Some(pos) => handle[pos + 1..].to_string(),
                    None => handle.clone(),
                };
                (key, None)
            }
            Value::Object(_) => match value.get(ATTR_KEY).and_then(Value::as_str) {
                Some(key) => (key.to_string(), expected_revision(value, options)),
                None => return Ok(ErrorCode::DocumentHandleBad),
            },
            _ => return Ok(ErrorCode::DocumentHandleBad),
        };

        let write = match collection.remove(&key, expected.as_ref()) {
            Ok(write) => write,
            Err(err) if err.code == ErrorCode::Conflict => {
                self.conflict_identity(results, cid, &key, &err, options)?;
                return Ok(ErrorCode::Conflict);
            }
            Err(err) => return Ok(err.code),
        };

        if !options.silent {
            let old = if options.return_old { write.old.as_ref() } else { None };
            results.push(build_document_identity(
                self.resolver(),
                cid,
                &key,
                &write.revision,
                None,
                old,
                None,
            )?);
        }
        Ok(ErrorCode::NoError)
    }

    pub(crate) fn remove_local(
        &mut self,
        collection_name: &str,
        value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        let (cid, collection) = self.prepare_collection(collection_name)?;
        self.promote_to_write(cid)?;
        let _ditch = self.order_ditch(cid)?;

        if let Err(err) = self.lock(cid, AccessType::Write) {
            return Ok(OperationResult::from_code(err.code));
        }

        let mut results = ResultCollector::new(value.is_array());
        let mut code = ErrorCode::NoError;
        if let Some(batch) = value.as_array() {
            for element in batch {
                code = self.remove_one(&collection, cid, element, options, &mut results)?;
                if code.is_error() {
                    break;
                }
            }
        } else {
            code = self.remove_one(&collection, cid, value, options, &mut results)?;
        }

        if self.database().role().is_db_server() && !code.is_error() {
            replicate_to_followers(
                self.database(),
                &collection,
                RequestMethod::Delete,
                value,
                options,
            );
        }

        self.unlock(cid, AccessType::Write)?;
        if code.is_error() {
            self.register_failed_operation();
        }
        Ok(OperationResult::with_payload(results.into_payload(), code, options.wait_for_sync))
    }

    // ------------------------------------------------------------------
    // truncate
    // ------------------------------------------------------------------

    pub(crate) fn truncate_local(
        &mut self,
        collection_name: &str,
        _options: &OperationOptions,
    ) -> Result<OperationResult> {
        let (cid, collection) = self.prepare_collection(collection_name)?;
        self.promote_to_write(cid)?;
        let _ditch = self.order_ditch(cid)?;

        if let Err(err) = self.lock(cid, AccessType::Write) {
            return Ok(OperationResult::from_code(err.code));
        }

        // Revisions are irrelevant when everything goes.
        let mut failure: Option<ErrorCode> = None;
        collection.primary_index().invoke_on_all_elements_for_removal(|key| {
            match collection.remove(key, None) {
                Ok(_) => true,
                Err(err) => {
                    failure = Some(err.code);
                    false
                }
            }
        });

        self.unlock(cid, AccessType::Write)?;
        if let Some(code) = failure {
            self.register_failed_operation();
            return Ok(OperationResult::from_code(code));
        }
        Ok(OperationResult::ok())
    }

    // ------------------------------------------------------------------
    // all / allKeys / any / count
    // ------------------------------------------------------------------

    fn drain_cursor(
        &self,
        collection_name: &str,
        cursor_type: CursorType,
        skip: u64,
        limit: u64,
    ) -> Result<std::result::Result<Vec<Value>, ErrorCode>> {
        let batch_size = self.database().config().cursor_batch_size;
        let mut cursor = self.index_scan(
            collection_name,
            cursor_type,
            None,
            None,
            skip,
            limit,
            batch_size,
            false,
        )?;

        let mut documents = Vec::new();
        while cursor.has_more() {
            let result = cursor.get_more();
            if result.failed() {
                return Ok(Err(result.code));
            }
            if let Some(Value::Array(batch)) = result.payload {
                documents.extend(batch);
            }
        }
        Ok(Ok(documents))
    }

    pub(crate) fn all_local(
        &self,
        collection_name: &str,
        skip: u64,
        limit: u64,
        _options: &OperationOptions,
    ) -> Result<OperationResult> {
        let (cid, _collection) = self.prepare_collection(collection_name)?;
        let _ditch = self.order_ditch(cid)?;

        if let Err(err) = self.lock(cid, AccessType::Read) {
            return Ok(OperationResult::from_code(err.code));
        }

        let documents = match self.drain_cursor(collection_name, CursorType::All, skip, limit)? {
            Ok(documents) => documents,
            Err(code) => return Ok(OperationResult::from_code(code)),
        };

        self.unlock(cid, AccessType::Read)?;
        Ok(OperationResult::with_payload(
            Some(Value::Array(documents)),
            ErrorCode::NoError,
            false,
        ))
    }

    pub(crate) fn all_keys_local(
        &self,
        collection_name: &str,
        prefix: &str,
        _options: &OperationOptions,
    ) -> Result<OperationResult> {
        let (cid, _collection) = self.prepare_collection(collection_name)?;
        let _ditch = self.order_ditch(cid)?;

        if let Err(err) = self.lock(cid, AccessType::Read) {
            return Ok(OperationResult::from_code(err.code));
        }

        let documents = match self.drain_cursor(collection_name, CursorType::All, 0, u64::MAX)? {
            Ok(documents) => documents,
            Err(code) => return Ok(OperationResult::from_code(code)),
        };

        let keys = documents
            .iter()
            .filter_map(|doc| doc.get(ATTR_KEY).and_then(Value::as_str))
            .map(|key| Value::String(format!("{prefix}{key}")))
            .collect();

        self.unlock(cid, AccessType::Read)?;
        Ok(OperationResult::with_payload(
            Some(Value::object([("documents", Value::Array(keys))])),
            ErrorCode::NoError,
            false,
        ))
    }

    pub(crate) fn any_local(
        &self,
        collection_name: &str,
        skip: u64,
        limit: u64,
    ) -> Result<OperationResult> {
        let (cid, _collection) = self.prepare_collection(collection_name)?;
        let _ditch = self.order_ditch(cid)?;

        if let Err(err) = self.lock(cid, AccessType::Read) {
            return Ok(OperationResult::from_code(err.code));
        }

        let documents = match self.drain_cursor(collection_name, CursorType::Any, skip, limit)? {
            Ok(documents) => documents,
            Err(code) => return Ok(OperationResult::from_code(code)),
        };

        self.unlock(cid, AccessType::Read)?;
        Ok(OperationResult::with_payload(
            Some(Value::Array(documents)),
            ErrorCode::NoError,
            false,
        ))
    }

    pub(crate) fn count_local(&self, collection_name: &str) -> Result<OperationResult> {
        let (cid, collection) = self.prepare_collection(collection_name)?;

        if let Err(err) = self.lock(cid, AccessType::Read) {
            return Ok(OperationResult::from_code(err.code));
        }
        let size = collection.size();
        self.unlock(cid, AccessType::Read)?;

        Ok(OperationResult::with_payload(Some(Value::from(size)), ErrorCode::NoError, false))
    }
}
