//! Error types for the document store library.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or committing documents.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An update targeted a document that does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// A create targeted a document that already exists
    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    /// A document read by the transaction changed before commit
    #[error("Transaction conflict on {0}")]
    Conflict(String),

    /// Backend cannot be reached or refused the connection
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend ran out of resources
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Path does not address a document or collection
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Transaction API misuse (e.g. a read after a write)
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Stored data does not match the expected shape
    #[error("Malformed document {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether re-running the whole transaction body may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}
