//! In-memory document collections.
//!
//! A collection owns its documents, its index registry (the primary index is
//! always slot zero) and its shard bookkeeping. The per-document write
//! operations below enforce revision checks and keep all indexes consistent,
//! rolling back partial index maintenance when a unique constraint rejects a
//! write. Locking is *not* taken here -- the transaction façade acquires the
//! collection lock explicitly around each operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use vellumdb_core::{
    encode_custom_id, extract_revision, CollectionId, Error, ErrorCode, IndexId,
    OperationOptions, Revision, Value, ATTR_ID, ATTR_KEY, ATTR_REV,
};
use vellumdb_index::{Index, IndexDescriptor};

use crate::ditch::DocumentDitch;
use crate::followers::FollowerInfo;
use crate::lock::CollectionLock;

/// The kind of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionType {
    /// Plain documents.
    Document,
    /// Edge documents carrying `_from`/`_to`.
    Edge,
}

/// A stored document: its revision and its full body.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// Current revision of the document.
    pub revision: Revision,
    /// Full body, including the reserved identity attributes.
    pub body: Value,
}

/// Outcome of a successful per-document write.
#[derive(Debug, Clone)]
pub struct DocumentWrite {
    /// The document key.
    pub key: String,
    /// The revision after the write (for removes: the removed revision).
    pub revision: Revision,
    /// The revision replaced by the write, if any.
    pub old_revision: Option<Revision>,
    /// The previous body, if any.
    pub old: Option<Value>,
    /// The body after the write (for removes: the removed body).
    pub new: Value,
}

/// A failed per-document write.
///
/// Revision conflicts carry the actual stored revision and the stored body
/// so the caller can still report the current document identity.
#[derive(Debug, Clone)]
pub struct WriteError {
    /// The error kind.
    pub code: ErrorCode,
    /// Failure detail.
    pub message: String,
    /// The stored revision, on a revision conflict.
    pub actual_revision: Option<Revision>,
    /// The stored body, on a revision conflict.
    pub old: Option<Value>,
}

impl WriteError {
    /// A write error with the kind's default message.
    #[must_use]
    pub fn code(code: ErrorCode) -> Self {
        Self { code, message: code.as_str().to_string(), actual_revision: None, old: None }
    }

    /// A revision conflict carrying the stored state.
    #[must_use]
    pub fn conflict(actual: Revision, old: Value) -> Self {
        Self {
            code: ErrorCode::Conflict,
            message: ErrorCode::Conflict.as_str().to_string(),
            actual_revision: Some(actual),
            old: Some(old),
        }
    }
}

impl From<Error> for WriteError {
    fn from(err: Error) -> Self {
        Self { code: err.code, message: err.message, actual_revision: None, old: None }
    }
}

/// An in-memory document collection.
#[derive(Debug)]
pub struct DocumentCollection {
    id: CollectionId,
    name: String,
    collection_type: CollectionType,
    documents: RwLock<HashMap<String, StoredDocument>>,
    indexes: RwLock<Vec<Arc<Index>>>,
    lock: CollectionLock,
    ditches: AtomicU64,
    followers: FollowerInfo,
    next_key: AtomicU64,
    next_revision: AtomicU64,
}

impl DocumentCollection {
    /// Create an empty collection with its primary index (and, for edge
    /// collections, the edge index).
    #[must_use]
    pub fn new(id: CollectionId, name: impl Into<String>, collection_type: CollectionType) -> Self {
        let mut indexes = vec![Arc::new(Index::new(IndexDescriptor::primary(IndexId::new(0))))];
        if collection_type == CollectionType::Edge {
            indexes.push(Arc::new(Index::new(IndexDescriptor::edge(IndexId::new(1)))));
        }
        Self {
            id,
            name: name.into(),
            collection_type,
            documents: RwLock::new(HashMap::new()),
            indexes: RwLock::new(indexes),
            lock: CollectionLock::new(),
            ditches: AtomicU64::new(0),
            followers: FollowerInfo::new(),
            next_key: AtomicU64::new(1),
            next_revision: AtomicU64::new(1),
        }
    }

    /// The collection id.
    #[must_use]
    pub fn id(&self) -> CollectionId {
        self.id
    }

    /// The collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The collection kind.
    #[must_use]
    pub fn collection_type(&self) -> CollectionType {
        self.collection_type
    }

    /// Number of documents.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.documents.read().len() as u64
    }

    /// The collection-level lock.
    #[must_use]
    pub fn lock(&self) -> &CollectionLock {
        &self.lock
    }

    /// Shard follower bookkeeping.
    #[must_use]
    pub fn followers(&self) -> &FollowerInfo {
        &self.followers
    }

    // ------------------------------------------------------------------
    // Ditches
    // ------------------------------------------------------------------

    /// Order a ditch: a scoped reservation preventing compaction from
    /// invalidating document pointers for the duration of an operation.
    #[must_use]
    pub fn order_ditch(self: &Arc<Self>) -> DocumentDitch {
        DocumentDitch::order(Arc::clone(self))
    }

    pub(crate) fn ditch_acquired(&self) {
        self.ditches.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn ditch_released(&self) {
        self.ditches.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of outstanding ditches.
    #[must_use]
    pub fn ditch_count(&self) -> u64 {
        self.ditches.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    /// The always-present primary index.
    #[must_use]
    pub fn primary_index(&self) -> Arc<Index> {
        Arc::clone(&self.indexes.read()[0])
    }

    /// Snapshot of all indexes.
    #[must_use]
    pub fn indexes(&self) -> Vec<Arc<Index>> {
        self.indexes.read().clone()
    }

    /// Look up an index by id.
    #[must_use]
    pub fn lookup_index(&self, id: IndexId) -> Option<Arc<Index>> {
        self.indexes.read().iter().find(|i| i.descriptor().id == id).cloned()
    }

    /// Create a secondary index and backfill it from the current documents.
    pub fn create_index(&self, descriptor: IndexDescriptor) -> Result<Arc<Index>, Error> {
        let index = Arc::new(Index::new(descriptor));
        for (key, doc) in self.documents.read().iter() {
            index.insert_document(key, &doc.body)?;
        }
        self.indexes.write().push(Arc::clone(&index));
        Ok(index)
    }

    // ------------------------------------------------------------------
    // Key and revision generation
    // ------------------------------------------------------------------

    fn generate_key(&self) -> String {
        self.next_key.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn generate_revision(&self) -> Revision {
        Revision::new(self.next_revision.fetch_add(1, Ordering::SeqCst).to_string())
    }

    // ------------------------------------------------------------------
    // Document operations
    // ------------------------------------------------------------------

    /// Read a document by key.
    pub fn read(&self, key: &str) -> Result<StoredDocument, Error> {
        self.documents
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::code(ErrorCode::DocumentNotFound))
    }

    /// Assemble the stored body: user attributes plus the reserved identity
    /// attributes.
    fn stored_body(&self, key: &str, revision: &Revision, value: &Value) -> Value {
        let mut attrs = value.as_object().cloned().unwrap_or_default();
        attrs.insert(ATTR_KEY.to_string(), Value::String(key.to_string()));
        attrs.insert(ATTR_ID.to_string(), Value::Custom(encode_custom_id(self.id)));
        attrs.insert(ATTR_REV.to_string(), Value::String(revision.as_str().to_string()));
        Value::Object(attrs)
    }

    fn index_document(&self, key: &str, body: &Value) -> Result<(), Error> {
        let indexes = self.indexes.read();
        let mut done: Vec<&Arc<Index>> = Vec::with_capacity(indexes.len());
        for index in indexes.iter() {
            if let Err(err) = index.insert_document(key, body) {
                for inserted in done {
                    inserted.remove_document(key, body);
                }
                return Err(err);
            }
            done.push(index);
        }
        Ok(())
    }

    fn unindex_document(&self, key: &str, body: &Value) {
        for index in self.indexes.read().iter() {
            index.remove_document(key, body);
        }
    }

    /// Insert a document.
    ///
    /// A caller-supplied `_key` must be a string; without one a key is
    /// generated. Duplicate keys and unique-index violations fail with
    /// `UniqueConstraintViolated`.
    pub fn insert(&self, value: &Value) -> Result<DocumentWrite, WriteError> {
        if !value.is_object() {
            return Err(WriteError::code(ErrorCode::DocumentTypeInvalid));
        }
        let key = match value.get(ATTR_KEY) {
            None => self.generate_key(),
            Some(Value::String(key)) if !key.is_empty() => key.clone(),
            Some(_) => return Err(WriteError::code(ErrorCode::DocumentKeyBad)),
        };

        let revision = self.generate_revision();
        let body = self.stored_body(&key, &revision, value);

        {
            let mut documents = self.documents.write();
            if documents.contains_key(&key) {
                return Err(WriteError::code(ErrorCode::UniqueConstraintViolated));
            }
            documents.insert(key.clone(), StoredDocument { revision: revision.clone(), body: body.clone() });
        }

        if let Err(err) = self.index_document(&key, &body) {
            self.documents.write().remove(&key);
            return Err(err.into());
        }

        Ok(DocumentWrite { key, revision, old_revision: None, old: None, new: body })
    }

    /// Patch a document: merge the new attributes over the stored body.
    pub fn update(
        &self,
        new_value: &Value,
        expected: Option<&Revision>,
        keep_null: bool,
    ) -> Result<DocumentWrite, WriteError> {
        self.modify(new_value, expected, Some(keep_null))
    }

    /// Replace a document body wholesale.
    pub fn replace(
        &self,
        new_value: &Value,
        expected: Option<&Revision>,
    ) -> Result<DocumentWrite, WriteError> {
        self.modify(new_value, expected, None)
    }

    fn modify(
        &self,
        new_value: &Value,
        expected: Option<&Revision>,
        patch_keep_null: Option<bool>,
    ) -> Result<DocumentWrite, WriteError> {
        if !new_value.is_object() {
            return Err(WriteError::code(ErrorCode::DocumentTypeInvalid));
        }
        let key = match new_value.get(ATTR_KEY) {
            Some(Value::String(key)) if !key.is_empty() => key.clone(),
            _ => return Err(WriteError::code(ErrorCode::DocumentKeyBad)),
        };

        let previous = self.read(&key).map_err(WriteError::from)?;
        if let Some(expected) = expected {
            if expected != &previous.revision {
                return Err(WriteError::conflict(previous.revision, previous.body));
            }
        }

        let revision = self.generate_revision();
        let body = match patch_keep_null {
            Some(keep_null) => self.patched_body(&previous.body, new_value, &revision, keep_null),
            None => self.stored_body(&key, &revision, new_value),
        };

        // Swap the document, then re-index; on index failure restore both.
        {
            let mut documents = self.documents.write();
            documents.insert(
                key.clone(),
                StoredDocument { revision: revision.clone(), body: body.clone() },
            );
        }
        self.unindex_document(&key, &previous.body);
        if let Err(err) = self.index_document(&key, &body) {
            self.documents.write().insert(key.clone(), previous.clone());
            // Restoring the previous entries cannot conflict: they were
            // indexed before this operation started.
            if let Err(restore) = self.index_document(&key, &previous.body) {
                debug_assert!(false, "restoring index entries failed: {restore}");
            }
            return Err(err.into());
        }

        Ok(DocumentWrite {
            key,
            revision,
            old_revision: Some(previous.revision),
            old: Some(previous.body),
            new: body,
        })
    }

    fn patched_body(
        &self,
        old_body: &Value,
        patch: &Value,
        revision: &Revision,
        keep_null: bool,
    ) -> Value {
        let mut attrs = old_body.as_object().cloned().unwrap_or_default();
        if let Some(patch_attrs) = patch.as_object() {
            for (name, value) in patch_attrs {
                // Identity attributes are immutable under patching.
                if name == ATTR_KEY || name == ATTR_ID || name == ATTR_REV {
                    continue;
                }
                if value.is_null() && !keep_null {
                    attrs.remove(name);
                } else {
                    attrs.insert(name.clone(), value.clone());
                }
            }
        }
        attrs.insert(ATTR_REV.to_string(), Value::String(revision.as_str().to_string()));
        Value::Object(attrs)
    }

    /// Remove a document by key.
    pub fn remove(
        &self,
        key: &str,
        expected: Option<&Revision>,
    ) -> Result<DocumentWrite, WriteError> {
        let previous = self.read(key).map_err(WriteError::from)?;
        if let Some(expected) = expected {
            if expected != &previous.revision {
                return Err(WriteError::conflict(previous.revision, previous.body));
            }
        }

        self.documents.write().remove(key);
        self.unindex_document(key, &previous.body);

        Ok(DocumentWrite {
            key: key.to_string(),
            revision: previous.revision.clone(),
            old_revision: Some(previous.revision),
            old: Some(previous.body.clone()),
            new: previous.body,
        })
    }

    /// The stored revision of a document, if present.
    #[must_use]
    pub fn revision_of(&self, key: &str) -> Option<Revision> {
        self.documents.read().get(key).map(|d| d.revision.clone())
    }
}

/// Extract the expected revision from a request value, honoring
/// `ignore_revs`.
#[must_use]
pub fn expected_revision(value: &Value, options: &OperationOptions) -> Option<Revision> {
    if options.ignore_revs {
        None
    } else {
        extract_revision(value)
    }
}
