//! Batched operation cursors.
//!
//! A cursor wraps an index iterator and resolves document keys to bodies in
//! batches of up to `batch_size`, bounded by `limit`. Cursors either carry a
//! live iterator or just a failure code; a zero-limit scan produces a
//! successful, already-exhausted cursor.

use std::sync::Arc;

use vellumdb_core::{ErrorCode, Value};
use vellumdb_index::IndexIterator;
use vellumdb_storage::DocumentCollection;

use crate::transaction::result::OperationResult;

/// The scan kinds the cursor factory supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorType {
    /// A single batch starting at an arbitrary position.
    Any,
    /// Full scan in primary-index order.
    All,
    /// Scan of an explicitly chosen index.
    Index,
}

/// A batched cursor over documents.
#[derive(Debug)]
pub struct OperationCursor {
    code: ErrorCode,
    collection: Option<Arc<DocumentCollection>>,
    iterator: Option<IndexIterator>,
    limit: u64,
    batch_size: u64,
}

impl OperationCursor {
    /// A cursor that only carries a failure code.
    #[must_use]
    pub fn failed(code: ErrorCode) -> Self {
        Self { code, collection: None, iterator: None, limit: 0, batch_size: 0 }
    }

    /// A successful cursor with nothing to return.
    #[must_use]
    pub fn empty() -> Self {
        Self::failed(ErrorCode::NoError)
    }

    /// A live cursor.
    #[must_use]
    pub fn new(
        collection: Arc<DocumentCollection>,
        iterator: IndexIterator,
        limit: u64,
        batch_size: u64,
    ) -> Self {
        Self {
            code: ErrorCode::NoError,
            collection: Some(collection),
            iterator: Some(iterator),
            limit,
            batch_size: batch_size.max(1),
        }
    }

    /// The cursor status.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns `true` when the cursor failed to build.
    #[must_use]
    pub fn failed_to_build(&self) -> bool {
        self.code.is_error()
    }

    /// Returns `true` while more documents can be fetched.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.limit > 0 && self.iterator.as_ref().is_some_and(|it| !it.is_exhausted())
    }

    /// Fetch the next batch of documents.
    ///
    /// Keys whose document vanished between snapshot and fetch are skipped
    /// silently.
    pub fn get_more(&mut self) -> OperationResult {
        if self.code.is_error() {
            return OperationResult::from_code(self.code);
        }
        let (Some(collection), Some(iterator)) = (&self.collection, &mut self.iterator) else {
            return OperationResult::with_payload(
                Some(Value::Array(Vec::new())),
                ErrorCode::NoError,
                false,
            );
        };

        let mut documents = Vec::new();
        while self.limit > 0 && (documents.len() as u64) < self.batch_size {
            let Some(key) = iterator.next() else {
                break;
            };
            if let Ok(stored) = collection.read(&key) {
                documents.push(stored.body);
                self.limit -= 1;
            }
        }

        OperationResult::with_payload(Some(Value::Array(documents)), ErrorCode::NoError, false)
    }
}
