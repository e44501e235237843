//! VellumDB -- transaction and query-execution façade of a distributed
//! multi-model document database.
//!
//! A single [`Transaction`] façade represents one logical transaction over
//! any number of collections. It orchestrates reads, writes, index
//! selection, locking, and -- when the local process is a coordinator --
//! dispatch to remote shard servers. Higher-level query engines, REST
//! handlers and embedded scripts all enter the storage layer through it.
//!
//! # Quick Start
//!
//! ```
//! use vellumdb::cluster::ServerRole;
//! use vellumdb::transaction::{Transaction, TransactionContext};
//! use vellumdb::{AccessType, CollectionType, Database, OperationOptions, Value};
//!
//! # fn main() -> vellumdb::Result<()> {
//! let db = Database::new("_system", ServerRole::Single);
//! let users = db.create_collection("users", CollectionType::Document)?;
//!
//! let context = TransactionContext::standalone(db);
//! let mut trx = Transaction::new(context);
//! trx.add_collection(users.id(), AccessType::Write)?;
//! trx.begin()?;
//!
//! let doc = Value::object([("_key", Value::from("alice"))]);
//! let result = trx.insert("users", &doc, &OperationOptions::new())?;
//! assert!(result.is_ok());
//!
//! trx.commit()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`transaction`] -- the façade: lifecycle, CRUD pipelines, planner
//! - [`cursor`] -- batched cursors over index scans
//! - [`cluster`] -- deployment roles, shard dispatch, follower replication
//! - [`database`] -- the collection registry and name resolver
//! - [`debug`] -- fail points and the debug request surface

#![deny(clippy::unwrap_used)]

pub mod cluster;
pub mod config;
pub mod cursor;
pub mod database;
pub mod debug;
pub mod transaction;

pub use config::DatabaseConfig;
pub use cursor::{CursorType, OperationCursor};
pub use database::Database;
pub use transaction::planner::{sort_ors, IndexUsage};
pub use transaction::{KeysType, OperationResult, Transaction, TransactionContext};

// Re-export the shared core vocabulary.
pub use vellumdb_core::{
    Error, ErrorCode, OperationOptions, Result, Revision, TransactionId, Value,
};
pub use vellumdb_index::{IndexDescriptor, IndexHandle, IndexType};
pub use vellumdb_storage::{AccessType, CollectionType};
