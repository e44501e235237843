//! Ditches: scoped compaction reservations.

use std::sync::Arc;

use crate::collection::DocumentCollection;

/// A scoped reservation on a collection.
///
/// While at least one ditch is outstanding, background compaction must not
/// invalidate in-memory document pointers. The reservation is released when
/// the ditch is dropped, whether the operation succeeded or failed.
#[derive(Debug)]
pub struct DocumentDitch {
    collection: Arc<DocumentCollection>,
}

impl DocumentDitch {
    pub(crate) fn order(collection: Arc<DocumentCollection>) -> Self {
        collection.ditch_acquired();
        Self { collection }
    }

    /// The collection this ditch protects.
    #[must_use]
    pub fn collection(&self) -> &Arc<DocumentCollection> {
        &self.collection
    }
}

impl Drop for DocumentDitch {
    fn drop(&mut self) {
        self.collection.ditch_released();
    }
}
