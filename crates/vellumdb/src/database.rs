//! The database handle.
//!
//! A [`Database`] owns the collection registry, knows the deployment role of
//! the process it lives in, and carries the shard-dispatch implementation on
//! coordinators and shard leaders. It is also the name resolver the identity
//! codec and the transaction façade use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use vellumdb_core::{
    CollectionId, CollectionNameResolver, Error, ErrorCode, Result, TransactionId,
};
use vellumdb_storage::{CollectionType, DocumentCollection};

use crate::cluster::{ServerRole, ShardDispatch};
use crate::config::DatabaseConfig;

struct DatabaseInner {
    name: String,
    role: ServerRole,
    config: DatabaseConfig,
    by_name: RwLock<HashMap<String, Arc<DocumentCollection>>>,
    by_id: RwLock<HashMap<CollectionId, Arc<DocumentCollection>>>,
    next_cid: AtomicU64,
    next_tid: AtomicU64,
    dispatch: RwLock<Option<Arc<dyn ShardDispatch>>>,
}

/// A handle to one database.
///
/// Cloning is cheap; all clones share the same registry.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Create a database with default configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, role: ServerRole) -> Self {
        Self::with_config(name, role, DatabaseConfig::default())
    }

    /// Create a database with explicit configuration.
    #[must_use]
    pub fn with_config(name: impl Into<String>, role: ServerRole, config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                name: name.into(),
                role,
                config,
                by_name: RwLock::new(HashMap::new()),
                by_id: RwLock::new(HashMap::new()),
                next_cid: AtomicU64::new(1),
                next_tid: AtomicU64::new(1),
                dispatch: RwLock::new(None),
            }),
        }
    }

    /// The database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The deployment role of this process.
    #[must_use]
    pub fn role(&self) -> ServerRole {
        self.inner.role
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    /// Install the shard-dispatch implementation.
    pub fn set_dispatch(&self, dispatch: Arc<dyn ShardDispatch>) {
        *self.inner.dispatch.write() = Some(dispatch);
    }

    /// The shard-dispatch implementation, if any.
    #[must_use]
    pub fn dispatch(&self) -> Option<Arc<dyn ShardDispatch>> {
        self.inner.dispatch.read().clone()
    }

    /// Generate a transaction id.
    #[must_use]
    pub fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.inner.next_tid.fetch_add(1, Ordering::SeqCst))
    }

    /// Create a collection.
    ///
    /// On a coordinator the created collection acts as the plan view (name,
    /// id, type and index descriptors); its documents are never touched.
    pub fn create_collection(
        &self,
        name: &str,
        collection_type: CollectionType,
    ) -> Result<Arc<DocumentCollection>> {
        let mut by_name = self.inner.by_name.write();
        if by_name.contains_key(name) {
            return Err(Error::with_message(
                ErrorCode::BadParameter,
                format!("duplicate collection name '{name}'"),
            ));
        }
        let cid = CollectionId::new(self.inner.next_cid.fetch_add(1, Ordering::SeqCst));
        let collection = Arc::new(DocumentCollection::new(cid, name, collection_type));
        by_name.insert(name.to_string(), Arc::clone(&collection));
        self.inner.by_id.write().insert(cid, Arc::clone(&collection));
        Ok(collection)
    }

    /// Look up a collection by name.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<Arc<DocumentCollection>> {
        self.inner.by_name.read().get(name).cloned()
    }

    /// Look up a collection by id.
    #[must_use]
    pub fn collection_by_id(&self, cid: CollectionId) -> Option<Arc<DocumentCollection>> {
        self.inner.by_id.read().get(&cid).cloned()
    }

    /// Names of all collections.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.by_name.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl CollectionNameResolver for Database {
    fn collection_id(&self, name: &str) -> Option<CollectionId> {
        self.collection(name).map(|c| c.id())
    }

    fn collection_name(&self, cid: CollectionId) -> Option<String> {
        self.collection_by_id(cid).map(|c| c.name().to_string())
    }
}
