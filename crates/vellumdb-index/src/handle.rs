//! Shared index handles.

use std::fmt;
use std::sync::Arc;

use vellumdb_core::Value;

use crate::index::Index;

/// A shared reference to an index.
///
/// Multiple handles may refer to the same index; equality is reference
/// equality on the underlying index. Handles carry enough descriptor access
/// for the planner to work without touching the entries.
#[derive(Clone)]
pub struct IndexHandle {
    index: Arc<Index>,
}

impl IndexHandle {
    /// Wrap an index in a handle.
    #[must_use]
    pub fn new(index: Arc<Index>) -> Self {
        Self { index }
    }

    /// The underlying index.
    #[must_use]
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    /// Serialise the descriptor, optionally with figures.
    #[must_use]
    pub fn to_value(&self, with_figures: bool) -> Value {
        self.index.to_value(with_figures)
    }
}

impl PartialEq for IndexHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.index, &other.index)
    }
}

impl Eq for IndexHandle {}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle").field("descriptor", self.index.descriptor()).finish()
    }
}
