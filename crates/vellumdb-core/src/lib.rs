//! Core types for VellumDB.
//!
//! This crate holds everything the façade crates agree on: the tagged-tree
//! [`Value`] model, the document identity codec, the wire error kinds, the
//! filter/sort condition trees, and the per-operation options.
//!
//! The crates layer as follows:
//!
//! ```text
//! vellumdb            -- transaction façade, planner, CRUD pipelines
//!   ├── vellumdb-storage -- transaction state, collections, locks, ditches
//!   ├── vellumdb-index   -- index capability surface and iterators
//!   └── vellumdb-core    -- this crate
//! ```

#![deny(clippy::unwrap_used)]

pub mod condition;
pub mod error;
pub mod identity;
pub mod ids;
pub mod options;
pub mod value;


pub use condition::{
    attribute_path, path_to_string, AttributePath, CmpOp, Comparison, Condition, Operand,
    SortCondition, SortField,
};
pub use error::{Error, ErrorCode, Result};
pub use identity::{
    build_document_identity, decode_custom_id, encode_custom_id, extract_id_string, extract_key,
    extract_revision, CollectionNameResolver, ATTR_ID, ATTR_KEY, ATTR_NEW, ATTR_OLD, ATTR_OLD_REV,
    ATTR_REV, ID_CUSTOM_TAG,
};
pub use ids::{CollectionId, IndexId, Revision, TransactionId};
pub use options::OperationOptions;
pub use value::{from_json, from_json_str, to_json_string, Value};
