//! Transaction contexts.
//!
//! A context ties a façade to its database (and thus the name resolver),
//! decides whether embedding is allowed, and remembers the parent state an
//! embedded façade must adopt. When a top-level transaction frees its state,
//! the context records whether any operation inside it failed.

use std::sync::Arc;

use parking_lot::Mutex;

use vellumdb_core::TransactionId;
use vellumdb_storage::TransactionState;

use crate::database::Database;

/// Shared context of one or more (nested) transaction façades.
pub struct TransactionContext {
    database: Database,
    embeddable: bool,
    parent: Mutex<Option<Arc<Mutex<TransactionState>>>>,
    results: Mutex<Vec<(TransactionId, bool)>>,
}

impl TransactionContext {
    /// A context that refuses embedding: each façade gets its own state.
    #[must_use]
    pub fn standalone(database: Database) -> Arc<Self> {
        Arc::new(Self {
            database,
            embeddable: false,
            parent: Mutex::new(None),
            results: Mutex::new(Vec::new()),
        })
    }

    /// A context that lets later façades embed into the first one.
    #[must_use]
    pub fn embeddable(database: Database) -> Arc<Self> {
        Arc::new(Self {
            database,
            embeddable: true,
            parent: Mutex::new(None),
            results: Mutex::new(Vec::new()),
        })
    }

    /// The database this context operates on.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Whether embedding is allowed.
    #[must_use]
    pub fn is_embeddable(&self) -> bool {
        self.embeddable
    }

    /// The state of the currently registered transaction, if any.
    ///
    /// A façade constructed while this is set adopts the state as its
    /// parent.
    #[must_use]
    pub fn parent_state(&self) -> Option<Arc<Mutex<TransactionState>>> {
        self.parent.lock().clone()
    }

    /// Register a new top-level transaction state.
    pub(crate) fn register_transaction(&self, state: Arc<Mutex<TransactionState>>) {
        *self.parent.lock() = Some(state);
    }

    /// Drop the registration of the top-level transaction.
    pub(crate) fn unregister_transaction(&self) {
        *self.parent.lock() = None;
    }

    /// Record the outcome of a freed top-level transaction.
    pub(crate) fn store_transaction_result(&self, id: TransactionId, had_failed_operations: bool) {
        self.results.lock().push((id, had_failed_operations));
    }

    /// Outcomes recorded so far: `(id, had_failed_operations)` pairs.
    #[must_use]
    pub fn transaction_results(&self) -> Vec<(TransactionId, bool)> {
        self.results.lock().clone()
    }
}
