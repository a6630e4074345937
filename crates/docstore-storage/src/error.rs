//! Storage engine error taxonomy.
//!
//! This enum is internal to the engine; `docstore::facade` maps each variant
//! onto the wire error-code taxonomy. No crate below the facade constructs a
//! wire error-code string directly.

use docstore_core::Item;

/// One entry of a failed `TransactWriteItems` call, aligned positionally
/// with the request's `TransactItems`.
#[derive(Debug, Clone, Default)]
pub struct CancellationReason {
    pub condition_failed: bool,
    pub item: Option<Item>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{kind} not found: {name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("resource already in use: {name}")]
    ResourceInUse { name: String },

    #[error("validation error: {0}")]
    Validation(String),

    /// A single-item conditional write's condition evaluated to false.
    #[error("the conditional request failed")]
    ConditionalCheckFailed { item: Option<Box<Item>> },

    /// A `TransactWriteItems` call aborted because at least one action's
    /// condition failed.
    #[error("transaction cancelled")]
    TransactionCanceled { reasons: Vec<CancellationReason> },

    #[error("operation invoked after the store was disposed")]
    Disposed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("expression error: {0}")]
    Expr(#[from] docstore_query::ExprError),

    #[error("codec error: {0}")]
    Codec(#[from] docstore_codec::CodecError),

    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ResourceNotFound { kind: kind.into(), name: name.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}
