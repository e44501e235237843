//! The transaction façade.
//!
//! One [`Transaction`] represents a logical transaction over any number of
//! collections. It is the single entry point into the storage layer: CRUD,
//! index selection, cursors, and -- on a coordinator -- shard dispatch all go
//! through it. A façade belongs to one thread at a time and is not shareable.
//!
//! # Lifecycle
//!
//! A façade is constructed against a [`TransactionContext`]. If the context
//! already carries a running transaction and allows embedding, the new façade
//! adopts the parent's state and only accounts for itself through the nesting
//! level; otherwise it creates its own state. `begin` promotes the state to
//! running, `commit`/`abort` are terminal, and dropping a still-running
//! top-level façade aborts it.

pub mod context;
pub mod coordinator;
pub mod local;
pub mod planner;
pub mod result;

pub use context::TransactionContext;
pub use result::OperationResult;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use vellumdb_core::{
    CollectionId, CollectionNameResolver, Error, ErrorCode, OperationOptions, Result,
    TransactionId, Value,
};
use vellumdb_index::{validate_index_id, Index, IndexHandle, IndexType};
use vellumdb_storage::{
    AccessType, CollectionType, DocumentCollection, DocumentDitch, TransactionHints,
    TransactionState, TransactionStatus,
};

use crate::cursor::{CursorType, OperationCursor};
use crate::database::Database;

/// The key rendering requested from `allKeys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeysType {
    /// Bare keys.
    Key,
    /// `<collection>/<key>` ids.
    Id,
    /// Full document URL paths.
    Path,
}

/// A transaction façade.
pub struct Transaction {
    state: Option<Arc<Mutex<TransactionState>>>,
    context: Arc<TransactionContext>,
    external_id: TransactionId,
    setup_state: ErrorCode,
    nesting_level: u32,
    hints: TransactionHints,
    wait_for_sync: bool,
    allow_implicit_collections: bool,
    is_real: bool,
    /// Shards this thread already holds locks for; dispatch paths inject the
    /// no-lock header for them.
    nolock_shards: Option<HashSet<String>>,
}

impl Transaction {
    /// Create a façade with a generated transaction id.
    #[must_use]
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self::with_external_id(context, TransactionId::default())
    }

    /// Create a façade with a caller-supplied transaction id.
    #[must_use]
    pub fn with_external_id(context: Arc<TransactionContext>, external_id: TransactionId) -> Self {
        let is_real = !context.database().role().is_coordinator();
        let mut trx = Self {
            state: None,
            context,
            external_id,
            setup_state: ErrorCode::NoError,
            nesting_level: 0,
            hints: TransactionHints::NONE,
            wait_for_sync: false,
            allow_implicit_collections: true,
            is_real,
            nolock_shards: None,
        };
        trx.setup_transaction();
        trx
    }

    /// Check whether we run embedded in a parent transaction; adopt its
    /// state if so, create our own otherwise.
    fn setup_transaction(&mut self) {
        if let Some(parent) = self.context.parent_state() {
            self.setup_embedded(parent);
        } else {
            self.setup_toplevel();
        }
    }

    fn setup_embedded(&mut self, parent: Arc<Mutex<TransactionState>>) {
        debug_assert_eq!(self.nesting_level, 0);
        {
            let mut state = parent.lock();
            state.nesting_level += 1;
            self.nesting_level = state.nesting_level;
        }
        self.state = Some(parent);

        if !self.context.is_embeddable() {
            // We are embedded but the context disallows it; `begin` will
            // surface this.
            self.setup_state = ErrorCode::TransactionNested;
        }
    }

    fn setup_toplevel(&mut self) {
        debug_assert_eq!(self.nesting_level, 0);
        let id = if self.external_id.is_generated() {
            self.context.database().next_transaction_id()
        } else {
            self.external_id
        };
        let state = Arc::new(Mutex::new(TransactionState::new(id, None, self.wait_for_sync)));
        self.context.register_transaction(Arc::clone(&state));
        self.state = Some(state);
    }

    fn state(&self) -> Result<&Arc<Mutex<TransactionState>>> {
        self.state.as_ref().ok_or_else(|| Error::code(ErrorCode::TransactionInternal))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The database this transaction runs against.
    #[must_use]
    pub fn database(&self) -> &Database {
        self.context.database()
    }

    /// The shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<TransactionContext> {
        &self.context
    }

    /// The transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.state.as_ref().map_or(TransactionId::default(), |s| s.lock().id)
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.state.as_ref().map_or(TransactionStatus::Created, |s| s.lock().status())
    }

    /// Returns `true` when this façade shares a parent's state.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.nesting_level > 0
    }

    /// Returns `true` on single servers and shard servers; coordinators are
    /// routers only.
    #[must_use]
    pub fn is_real(&self) -> bool {
        self.is_real
    }

    /// The name resolver.
    #[must_use]
    pub fn resolver(&self) -> &dyn CollectionNameResolver {
        self.context.database()
    }

    // ------------------------------------------------------------------
    // Pre-begin configuration
    // ------------------------------------------------------------------

    /// Set the transaction timeout. Legal only before `begin`.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let state = self.state()?;
        let mut state = state.lock();
        if state.status() != TransactionStatus::Created {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        state.timeout = Some(timeout);
        Ok(())
    }

    /// Request that commits wait for disk sync. Legal only before `begin`.
    pub fn set_wait_for_sync(&mut self, wait_for_sync: bool) -> Result<()> {
        let state = self.state()?.clone();
        let mut state = state.lock();
        if state.status() != TransactionStatus::Created {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        self.wait_for_sync = wait_for_sync;
        state.wait_for_sync = wait_for_sync;
        Ok(())
    }

    /// Allow or forbid registering collections implicitly at runtime.
    pub fn set_allow_implicit_collections(&mut self, allow: bool) {
        self.allow_implicit_collections = allow;
    }

    /// Add a behavior hint for `begin`.
    pub fn add_hint(&mut self, hint: u32) {
        self.hints = TransactionHints::new(self.hints.bits() | hint);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Begin the transaction.
    ///
    /// A no-op past `Created`. Surfaces the setup error of a façade that was
    /// constructed in an illegal position (e.g. forbidden nesting).
    pub fn begin(&mut self) -> Result<()> {
        let state = self.state()?;
        if self.setup_state.is_error() {
            return Err(Error::code(self.setup_state));
        }
        let mut state = state.lock();
        if state.status() != TransactionStatus::Created {
            return Ok(());
        }
        // On a coordinator there is no engine transaction to begin; the
        // status flip is all there is.
        state.begin(self.hints, self.nesting_level)
    }

    /// Commit the transaction. Terminal at the top level.
    pub fn commit(&mut self) -> Result<()> {
        let state = self.state()?;
        let mut state = state.lock();
        if state.status() != TransactionStatus::Running {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        state.commit(self.nesting_level)
    }

    /// Abort the transaction. Terminal at the top level.
    pub fn abort(&mut self) -> Result<()> {
        let state = self.state()?;
        let mut state = state.lock();
        if state.status() != TransactionStatus::Running {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        state.abort(self.nesting_level)
    }

    /// Finish the transaction based on a prior outcome: commit on success,
    /// abort (preserving the error) otherwise.
    pub fn finish(&mut self, code: ErrorCode) -> Result<()> {
        if code == ErrorCode::NoError {
            return self.commit();
        }
        let _ = self.abort();
        Err(Error::code(code))
    }

    /// Record that an operation inside this transaction failed; a failed
    /// top-level transaction is force-aborted on drop and the fact stored in
    /// the context.
    pub fn register_failed_operation(&self) {
        if let Some(state) = &self.state {
            state.lock().had_failed_operations = true;
        }
    }

    // ------------------------------------------------------------------
    // Collection registration and locking
    // ------------------------------------------------------------------

    /// Register a collection by id.
    ///
    /// Top-level transactions may register collections only while `Created`;
    /// embedded transactions may register at any time while running.
    pub fn add_collection(&mut self, cid: CollectionId, access: AccessType) -> Result<()> {
        if self.setup_state.is_error() {
            return Err(Error::code(self.setup_state));
        }
        let state = self.state()?;
        let mut state = state.lock();
        match state.status() {
            TransactionStatus::Committed | TransactionStatus::Aborted => {
                return Err(Error::code(ErrorCode::TransactionInternal));
            }
            TransactionStatus::Running if !self.is_embedded() => {
                return Err(Error::code(ErrorCode::TransactionInternal));
            }
            _ => {}
        }
        let collection = self.context.database().collection_by_id(cid);
        state.add_collection(cid, access, collection, true)
    }

    /// Register a collection by name.
    pub fn add_collection_by_name(&mut self, name: &str, access: AccessType) -> Result<()> {
        let cid = self
            .resolver()
            .collection_id(name)
            .ok_or_else(|| Error::with_message(ErrorCode::CollectionNotFound, format!("'{name}'")))?;
        self.add_collection(cid, access)
    }

    /// Resolve a collection name and make sure it is registered with the
    /// running transaction, registering it implicitly when allowed.
    pub fn add_collection_at_runtime(&self, name: &str) -> Result<CollectionId> {
        let cid = self
            .resolver()
            .collection_id(name)
            .ok_or_else(|| Error::with_message(ErrorCode::CollectionNotFound, format!("'{name}'")))?;

        let state = self.state()?;
        let mut state = state.lock();
        if state.collection(cid).is_none() {
            let collection = self.context.database().collection_by_id(cid);
            state.add_collection(cid, AccessType::Read, collection, self.allow_implicit_collections)?;
        }
        Ok(cid)
    }

    /// The resolved collection behind a registered binding.
    pub fn document_collection(&self, cid: CollectionId) -> Result<Arc<DocumentCollection>> {
        let state = self.state()?;
        let state = state.lock();
        state
            .collection(cid)
            .and_then(|binding| binding.collection.clone())
            .ok_or_else(|| Error::code(ErrorCode::TransactionInternal))
    }

    /// Order a ditch on a collection for the duration of an operation.
    pub fn order_ditch(&self, cid: CollectionId) -> Result<DocumentDitch> {
        debug_assert!(matches!(
            self.status(),
            TransactionStatus::Running | TransactionStatus::Created
        ));
        Ok(self.document_collection(cid)?.order_ditch())
    }

    /// Read- or write-lock a registered collection.
    pub fn lock(&self, cid: CollectionId, access: AccessType) -> Result<()> {
        let state = self.state()?;
        let mut state = state.lock();
        if state.status() != TransactionStatus::Running {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        state.lock(cid, access, self.nesting_level)
    }

    /// Release a collection lock.
    pub fn unlock(&self, cid: CollectionId, access: AccessType) -> Result<()> {
        let state = self.state()?;
        let mut state = state.lock();
        if state.status() != TransactionStatus::Running {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        state.unlock(cid, access, self.nesting_level)
    }

    /// Returns `true` when a lock of at least the given strength is held.
    #[must_use]
    pub fn is_locked(&self, cid: CollectionId, access: AccessType) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| {
                let state = s.lock();
                state.status() == TransactionStatus::Running && state.is_locked(cid, access)
            })
    }

    // ------------------------------------------------------------------
    // Collection metadata
    // ------------------------------------------------------------------

    /// Names of all collections used in the transaction.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        let Some(state) = &self.state else {
            return Vec::new();
        };
        state
            .lock()
            .collections()
            .iter()
            .filter_map(|c| c.collection.as_ref().map(|coll| coll.name().to_string()))
            .collect()
    }

    /// Resolve a collection id to its name.
    #[must_use]
    pub fn collection_name(&self, cid: CollectionId) -> Option<String> {
        self.resolver().collection_name(cid)
    }

    /// The type of a collection.
    pub fn get_collection_type(&self, name: &str) -> Result<CollectionType> {
        self.context
            .database()
            .collection(name)
            .map(|c| c.collection_type())
            .ok_or_else(|| Error::with_message(ErrorCode::CollectionNotFound, format!("'{name}'")))
    }

    /// Returns `true` if the collection stores edges.
    pub fn is_edge_collection(&self, name: &str) -> Result<bool> {
        Ok(self.get_collection_type(name)? == CollectionType::Edge)
    }

    /// Returns `true` if the collection stores plain documents.
    pub fn is_document_collection(&self, name: &str) -> Result<bool> {
        Ok(self.get_collection_type(name)? == CollectionType::Document)
    }

    // ------------------------------------------------------------------
    // Index access
    // ------------------------------------------------------------------

    /// All indexes of a collection.
    ///
    /// On a coordinator the indexes are reconstructed from the cluster-plan
    /// descriptors; locally the collection registry is used.
    pub fn indexes_for_collection(&self, name: &str) -> Result<Vec<Arc<Index>>> {
        if self.database().role().is_coordinator() {
            return self.indexes_for_collection_coordinator(name);
        }
        let cid = self.add_collection_at_runtime(name)?;
        Ok(self.document_collection(cid)?.indexes())
    }

    fn indexes_for_collection_coordinator(&self, name: &str) -> Result<Vec<Arc<Index>>> {
        let collection = self.context.database().collection(name).ok_or_else(|| {
            Error::with_message(
                ErrorCode::Internal,
                format!("collection not found '{name}' in database '{}'", self.database().name()),
            )
        })?;
        collection
            .indexes()
            .iter()
            .map(|index| vellumdb_index::index_from_descriptor(&index.descriptor().to_value()))
            .collect()
    }

    /// The edge index of an edge collection.
    pub fn edge_index_handle(&self, name: &str) -> Result<IndexHandle> {
        if !self.is_edge_collection(name)? {
            return Err(Error::code(ErrorCode::CollectionTypeInvalid));
        }
        self.indexes_for_collection(name)?
            .into_iter()
            .find(|idx| idx.index_type() == IndexType::Edge)
            .map(IndexHandle::new)
            .ok_or_else(|| Error::code(ErrorCode::CollectionTypeInvalid))
    }

    /// Look up an index by its textual identifier.
    ///
    /// Either fails or returns a valid handle.
    pub fn get_index_by_identifier(&self, collection: &str, id: &str) -> Result<IndexHandle> {
        if id.is_empty() {
            return Err(Error::with_message(
                ErrorCode::BadParameter,
                "the index id cannot be empty",
            ));
        }
        if !validate_index_id(id) {
            return Err(Error::code(ErrorCode::IndexHandleBad));
        }
        let iid = vellumdb_core::IndexId::new(
            id.parse::<u64>()
                .map_err(|_| Error::code(ErrorCode::IndexHandleBad))?,
        );

        self.indexes_for_collection(collection)?
            .into_iter()
            .find(|idx| idx.descriptor().id == iid)
            .map(IndexHandle::new)
            .ok_or_else(|| {
                Error::with_message(
                    ErrorCode::IndexNotFound,
                    format!("could not find index '{id}' in collection '{collection}'"),
                )
            })
    }

    /// Walk all documents of a collection in primary-index order, stopping
    /// when the callback returns `false`.
    pub fn invoke_on_all_elements(
        &self,
        name: &str,
        callback: impl FnMut(&str) -> bool,
    ) -> Result<()> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if self.database().role().is_coordinator() {
            return Err(Error::code(ErrorCode::NotImplemented));
        }
        let cid = self.add_collection_at_runtime(name)?;
        let collection = self.document_collection(cid)?;
        let _ditch = self.order_ditch(cid)?;

        self.lock(cid, AccessType::Read)?;
        collection.primary_index().invoke_on_all_elements(callback);
        self.unlock(cid, AccessType::Read)
    }

    // ------------------------------------------------------------------
    // No-lock header override
    // ------------------------------------------------------------------

    /// Declare shards this thread already holds locks for; dispatch paths
    /// will ask the receiving servers not to re-lock them. Cleared with
    /// [`clear_nolock_shards`](Self::clear_nolock_shards) when the dispatch
    /// path returns.
    pub fn set_nolock_shards(&mut self, shards: HashSet<String>) {
        self.nolock_shards = Some(shards);
    }

    /// Clear the no-lock override.
    pub fn clear_nolock_shards(&mut self) {
        self.nolock_shards = None;
    }

    pub(crate) fn nolock_shards(&self) -> Option<&HashSet<String>> {
        self.nolock_shards.as_ref()
    }

    // ------------------------------------------------------------------
    // Cursor factory
    // ------------------------------------------------------------------

    /// Build a batched cursor over a collection.
    ///
    /// `Any` and `All` use the primary index and take neither handle nor
    /// search value; `Index` requires a handle (an absent one is a
    /// bad-parameter error) and accepts an equality-prefix search value.
    /// Refused on coordinators. A zero limit yields an empty successful
    /// cursor. `skip` entries are skipped before the cursor is returned.
    #[allow(clippy::too_many_arguments)]
    pub fn index_scan(
        &self,
        collection_name: &str,
        cursor_type: CursorType,
        index_handle: Option<&IndexHandle>,
        search: Option<&Value>,
        skip: u64,
        limit: u64,
        batch_size: u64,
        reverse: bool,
    ) -> Result<OperationCursor> {
        if self.database().role().is_coordinator() {
            // Index scans run where the data lives.
            return Err(Error::code(ErrorCode::OnlyOnDbServer));
        }
        if limit == 0 {
            return Ok(OperationCursor::empty());
        }

        let cid = self.add_collection_at_runtime(collection_name)?;
        let collection = self.document_collection(cid)?;

        let mut iterator = match cursor_type {
            CursorType::Any => {
                debug_assert!(index_handle.is_none() && search.is_none());
                collection.primary_index().any_iterator()
            }
            CursorType::All => {
                debug_assert!(index_handle.is_none() && search.is_none());
                collection.primary_index().all_iterator(reverse)
            }
            CursorType::Index => {
                let handle = index_handle.ok_or_else(|| {
                    Error::with_message(ErrorCode::BadParameter, "the index id cannot be empty")
                })?;
                let empty = Value::Array(Vec::new());
                handle.index().iterator_for_slice(search.unwrap_or(&empty), reverse)
            }
        };

        iterator.skip(skip);
        Ok(OperationCursor::new(collection, iterator, limit, batch_size))
    }

    /// Build a cursor for a specialized `AND` condition on a chosen index.
    #[allow(clippy::too_many_arguments)]
    pub fn index_scan_for_condition(
        &self,
        collection_name: &str,
        index_handle: Option<&IndexHandle>,
        condition: &vellumdb_core::Condition,
        variable: &str,
        limit: u64,
        batch_size: u64,
        reverse: bool,
    ) -> Result<OperationCursor> {
        if self.database().role().is_coordinator() {
            return Err(Error::code(ErrorCode::OnlyOnDbServer));
        }
        if limit == 0 {
            return Ok(OperationCursor::empty());
        }
        let handle = index_handle.ok_or_else(|| {
            Error::with_message(ErrorCode::BadParameter, "the index id cannot be empty")
        })?;

        let cid = self.add_collection_at_runtime(collection_name)?;
        let collection = self.document_collection(cid)?;
        let iterator = handle.index().iterator_for_condition(condition, variable, reverse);
        Ok(OperationCursor::new(collection, iterator, limit, batch_size))
    }

    // ------------------------------------------------------------------
    // CRUD entry points
    // ------------------------------------------------------------------

    /// Read one or multiple documents.
    pub fn document(
        &self,
        collection: &str,
        value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if !value.is_object() && !value.is_array() {
            return Err(Error::code(ErrorCode::DocumentTypeInvalid));
        }
        if self.database().role().is_coordinator() {
            return self.document_coordinator(collection, value, options);
        }
        self.document_local(collection, value, options)
    }

    /// Create one or multiple documents.
    ///
    /// The single-document variant either succeeds or cleans up after
    /// itself; batches report per-document failures in the counter map.
    pub fn insert(
        &mut self,
        collection: &str,
        value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if !value.is_object() && !value.is_array() {
            return Err(Error::code(ErrorCode::DocumentTypeInvalid));
        }
        if self.database().role().is_coordinator() {
            return self.insert_coordinator(collection, value, options);
        }
        self.insert_local(collection, value, options)
    }

    /// Patch one or multiple documents.
    pub fn update(
        &mut self,
        collection: &str,
        new_value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if !new_value.is_object() && !new_value.is_array() {
            return Err(Error::code(ErrorCode::DocumentTypeInvalid));
        }
        if self.database().role().is_coordinator() {
            return self.modify_coordinator(collection, new_value, options, true);
        }
        self.modify_local(collection, new_value, options, true)
    }

    /// Replace one or multiple documents.
    pub fn replace(
        &mut self,
        collection: &str,
        new_value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if !new_value.is_object() && !new_value.is_array() {
            return Err(Error::code(ErrorCode::DocumentTypeInvalid));
        }
        if self.database().role().is_coordinator() {
            return self.modify_coordinator(collection, new_value, options, false);
        }
        self.modify_local(collection, new_value, options, false)
    }

    /// Remove one or multiple documents. Accepts objects, arrays, or a bare
    /// handle string.
    pub fn remove(
        &mut self,
        collection: &str,
        value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if !value.is_object() && !value.is_array() && !value.is_string() {
            return Err(Error::code(ErrorCode::DocumentTypeInvalid));
        }
        if self.database().role().is_coordinator() {
            return self.remove_coordinator(collection, value, options);
        }
        self.remove_local(collection, value, options)
    }

    /// Remove all documents of a collection.
    pub fn truncate(&mut self, collection: &str, options: &OperationOptions) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if self.database().role().is_coordinator() {
            return self.truncate_coordinator(collection, options);
        }
        self.truncate_local(collection, options)
    }

    /// Fetch all documents, using skip and limit.
    pub fn all(
        &self,
        collection: &str,
        skip: u64,
        limit: u64,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if self.database().role().is_coordinator() {
            return Err(Error::code(ErrorCode::NotImplemented));
        }
        self.all_local(collection, skip, limit, options)
    }

    /// Fetch all document keys, rendered per `keys_type`.
    pub fn all_keys(
        &self,
        collection: &str,
        keys_type: KeysType,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);

        let real_name = self
            .resolver()
            .collection_id(collection)
            .and_then(|cid| self.resolver().collection_name(cid))
            .unwrap_or_else(|| collection.to_string());
        let prefix = match keys_type {
            KeysType::Key => String::new(),
            KeysType::Id => format!("{real_name}/"),
            KeysType::Path => {
                format!("/_db/{}/_api/document/{}/", self.database().name(), real_name)
            }
        };

        if self.database().role().is_coordinator() {
            return Err(Error::code(ErrorCode::NotImplemented));
        }
        self.all_keys_local(collection, &prefix, options)
    }

    /// Read an arbitrary document.
    pub fn any(&self, collection: &str) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if self.database().role().is_coordinator() {
            return Err(Error::code(ErrorCode::NotImplemented));
        }
        self.any_local(collection, 0, 1)
    }

    /// Count the documents in a collection.
    pub fn count(&self, collection: &str) -> Result<OperationResult> {
        assert_eq!(self.status(), TransactionStatus::Running);
        if self.database().role().is_coordinator() {
            return self.count_coordinator(collection);
        }
        self.count_local(collection)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        if self.nesting_level > 0 {
            state.lock().nesting_level -= 1;
            return;
        }

        let mut guard = state.lock();
        if guard.status() == TransactionStatus::Running {
            tracing::warn!(id = %guard.id, "aborting still-running transaction on drop");
            let _ = guard.abort(0);
        }
        let id = guard.id;
        let had_failed_operations = guard.had_failed_operations;
        drop(guard);

        self.context.store_transaction_result(id, had_failed_operations);
        self.context.unregister_transaction();
    }
}
