//! Operation results.

use std::collections::HashMap;

use vellumdb_core::{ErrorCode, Value};

/// The outcome of one CRUD operation.
///
/// Multi-document operations report per-document failures through
/// `error_counts` instead of aborting the batch; `wait_for_sync` reflects
/// whether the write was synced (or, on a coordinator, whether the shard
/// reported `201`).
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// Top-level status.
    pub code: ErrorCode,
    /// Failure detail, when available.
    pub message: Option<String>,
    /// Result payload, if the operation produces one.
    pub payload: Option<Value>,
    /// Per-error-kind counters of a multi-document operation.
    pub error_counts: HashMap<ErrorCode, u64>,
    /// Whether the write was synced before returning.
    pub wait_for_sync: bool,
}

impl OperationResult {
    /// A successful result without payload.
    #[must_use]
    pub fn ok() -> Self {
        Self::from_code(ErrorCode::NoError)
    }

    /// A result carrying only a status.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
            payload: None,
            error_counts: HashMap::new(),
            wait_for_sync: false,
        }
    }

    /// A result carrying a status and a message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), ..Self::from_code(code) }
    }

    /// A result with payload and status.
    #[must_use]
    pub fn with_payload(payload: Option<Value>, code: ErrorCode, wait_for_sync: bool) -> Self {
        Self { payload, ..Self::from_code(code) }.waiting_for_sync(wait_for_sync)
    }

    /// A batch result with payload and per-kind error counters.
    #[must_use]
    pub fn with_counters(
        payload: Option<Value>,
        code: ErrorCode,
        wait_for_sync: bool,
        error_counts: HashMap<ErrorCode, u64>,
    ) -> Self {
        Self { error_counts, ..Self::with_payload(payload, code, wait_for_sync) }
    }

    fn waiting_for_sync(mut self, wait_for_sync: bool) -> Self {
        self.wait_for_sync = wait_for_sync;
        self
    }

    /// Returns `true` when the operation failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.code.is_error()
    }

    /// Returns `true` when the operation succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.failed()
    }
}

/// Append the error stub a failed batch element leaves in the result array,
/// and bump its per-kind counter.
pub fn push_batch_error(
    results: &mut Vec<Value>,
    error_counts: &mut HashMap<ErrorCode, u64>,
    code: ErrorCode,
) {
    results.push(Value::object([
        ("error", Value::Bool(true)),
        ("errorNum", Value::Int(code.num())),
    ]));
    *error_counts.entry(code).or_insert(0) += 1;
}
