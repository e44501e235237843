//! Index capability surface for VellumDB.
//!
//! Collections own a registry of indexes; the transaction façade consumes
//! them uniformly through this crate: descriptor access, filter/sort cost
//! estimation, condition specialization, and key iteration. The primary
//! index is always present.

#![deny(clippy::unwrap_used)]

pub mod descriptor;
pub mod handle;
pub mod index;
pub mod iterator;
pub mod keys;

pub use descriptor::{validate_index_id, IndexDescriptor, IndexType};
pub use handle::IndexHandle;
pub use index::{external_sort_cost, FilterCosts, Index, SortCosts};
pub use iterator::IndexIterator;
pub use keys::SortKey;

use std::sync::Arc;

use vellumdb_core::{Error, ErrorCode, Result, Value};

/// Construct an index from a wire descriptor value.
///
/// This is the coordinator-side path: the cluster plan carries descriptors,
/// and planning needs live capability objects without any entries behind
/// them.
pub fn index_from_descriptor(value: &Value) -> Result<Arc<Index>> {
    let descriptor = IndexDescriptor::from_value(value).ok_or_else(|| {
        Error::with_message(ErrorCode::Internal, "invalid index descriptor")
    })?;
    Ok(Arc::new(Index::new(descriptor)))
}
