//! Per-operation options shared by the CRUD pipelines.

/// Options accepted by every document operation.
///
/// The flags mirror the wire-level query parameters; defaults are all off.
#[derive(Debug, Clone, Copy)]
pub struct OperationOptions {
    /// Wait for the write to be synced to disk before returning.
    pub wait_for_sync: bool,
    /// Skip revision checks on read/update/replace/remove.
    pub ignore_revs: bool,
    /// Include the previous document body (`old`) in the result.
    pub return_old: bool,
    /// Include the new document body (`new`) in the result.
    pub return_new: bool,
    /// Suppress result bodies entirely.
    pub silent: bool,
    /// Keep attributes that are set to null when patching (update only).
    pub keep_null: bool,
}

impl OperationOptions {
    /// Options with every flag off except `keep_null`, which defaults on.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wait_for_sync: false,
            ignore_revs: false,
            return_old: false,
            return_new: false,
            silent: false,
            keep_null: true,
        }
    }
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self::new()
    }
}
