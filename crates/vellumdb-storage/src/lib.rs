//! Storage-layer primitives for VellumDB.
//!
//! The façade crate builds on three things from here: the shared
//! [`TransactionState`] (status, collection bindings, lock bookkeeping),
//! in-memory [`DocumentCollection`]s with index maintenance and revision
//! checks, and the scoped resources around them (ditches, follower sets,
//! collection locks).
//!
//! On-disk engines and their datafile layout are out of scope; this crate is
//! the reference engine the façade is written against.

#![deny(clippy::unwrap_used)]

pub mod collection;
pub mod ditch;
pub mod followers;
pub mod lock;
pub mod transaction;

pub use collection::{
    expected_revision, CollectionType, DocumentCollection, DocumentWrite, StoredDocument,
    WriteError,
};
pub use ditch::DocumentDitch;
pub use followers::FollowerInfo;
pub use lock::CollectionLock;
pub use transaction::{
    AccessType, TransactionCollection, TransactionHints, TransactionState, TransactionStatus,
};
