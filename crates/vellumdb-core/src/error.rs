//! Error kinds and the hard-failure error type.
//!
//! Every operation outcome is described by an [`ErrorCode`], the stable set
//! of error kinds used on the wire. Soft, per-document outcomes travel inside
//! operation results; hard failures (broken preconditions, invalid blobs,
//! programmer mistakes) are returned as [`Error`] values and propagate with
//! `?`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error kinds used on the wire and in operation results.
///
/// Each kind has a numeric wire value (`errorNum`) that remote servers and
/// clients agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Operation succeeded.
    NoError,
    /// Unspecified internal failure.
    Internal,
    /// Allocation failure.
    OutOfMemory,
    /// The requested operation is not implemented for this deployment.
    NotImplemented,
    /// A caller-supplied parameter was invalid.
    BadParameter,
    /// The collection does not exist.
    CollectionNotFound,
    /// The collection has the wrong type for the operation.
    CollectionTypeInvalid,
    /// The document does not exist.
    DocumentNotFound,
    /// The document key is missing or malformed.
    DocumentKeyBad,
    /// The document handle is malformed.
    DocumentHandleBad,
    /// The value is not a valid document.
    DocumentTypeInvalid,
    /// The expected revision does not match the stored revision.
    Conflict,
    /// A unique index rejected the write.
    UniqueConstraintViolated,
    /// The index does not exist.
    IndexNotFound,
    /// The index handle is malformed.
    IndexHandleBad,
    /// Transaction bookkeeping failure.
    TransactionInternal,
    /// Nesting a transaction was not allowed by the context.
    TransactionNested,
    /// The operation is only available on a database server.
    OnlyOnDbServer,
}

impl ErrorCode {
    /// The numeric wire value.
    #[must_use]
    pub const fn num(self) -> i64 {
        match self {
            Self::NoError => 0,
            Self::Internal => 1,
            Self::OutOfMemory => 2,
            Self::NotImplemented => 3,
            Self::BadParameter => 4,
            Self::CollectionNotFound => 1100,
            Self::CollectionTypeInvalid => 1101,
            Self::DocumentNotFound => 1200,
            Self::DocumentKeyBad => 1201,
            Self::DocumentHandleBad => 1202,
            Self::DocumentTypeInvalid => 1203,
            Self::Conflict => 1204,
            Self::UniqueConstraintViolated => 1205,
            Self::IndexNotFound => 1300,
            Self::IndexHandleBad => 1301,
            Self::TransactionInternal => 1400,
            Self::TransactionNested => 1401,
            Self::OnlyOnDbServer => 1500,
        }
    }

    /// Look up a kind by its numeric wire value.
    #[must_use]
    pub const fn from_num(num: i64) -> Option<Self> {
        Some(match num {
            0 => Self::NoError,
            1 => Self::Internal,
            2 => Self::OutOfMemory,
            3 => Self::NotImplemented,
            4 => Self::BadParameter,
            1100 => Self::CollectionNotFound,
            1101 => Self::CollectionTypeInvalid,
            1200 => Self::DocumentNotFound,
            1201 => Self::DocumentKeyBad,
            1202 => Self::DocumentHandleBad,
            1203 => Self::DocumentTypeInvalid,
            1204 => Self::Conflict,
            1205 => Self::UniqueConstraintViolated,
            1300 => Self::IndexNotFound,
            1301 => Self::IndexHandleBad,
            1400 => Self::TransactionInternal,
            1401 => Self::TransactionNested,
            1500 => Self::OnlyOnDbServer,
            _ => return None,
        })
    }

    /// Default human-readable message for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoError => "no error",
            Self::Internal => "internal error",
            Self::OutOfMemory => "out of memory",
            Self::NotImplemented => "not implemented",
            Self::BadParameter => "bad parameter",
            Self::CollectionNotFound => "collection not found",
            Self::CollectionTypeInvalid => "invalid collection type",
            Self::DocumentNotFound => "document not found",
            Self::DocumentKeyBad => "invalid document key",
            Self::DocumentHandleBad => "invalid document handle",
            Self::DocumentTypeInvalid => "invalid document type",
            Self::Conflict => "revision conflict",
            Self::UniqueConstraintViolated => "unique constraint violated",
            Self::IndexNotFound => "index not found",
            Self::IndexHandleBad => "invalid index handle",
            Self::TransactionInternal => "transaction internal error",
            Self::TransactionNested => "transaction nesting not allowed",
            Self::OnlyOnDbServer => "only available on a database server",
        }
    }

    /// Returns `true` for every kind except `NoError`.
    #[must_use]
    pub fn is_error(self) -> bool {
        self != Self::NoError
    }
}

/// A hard failure carrying a wire error kind and a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", code.as_str())]
pub struct Error {
    /// The wire error kind.
    pub code: ErrorCode,
    /// Failure detail.
    pub message: String,
}

impl Error {
    /// Create an error with the kind's default message.
    #[must_use]
    pub fn code(code: ErrorCode) -> Self {
        Self { code, message: code.as_str().to_string() }
    }

    /// Create an error with a specific message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// A specialized `Result` type for VellumDB operations.
pub type Result<T> = std::result::Result<T, Error>;
