use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrency conflict occurred when saving a document.
    /// The expected version did not match the stored version.
    #[error(
        "Concurrency conflict for {collection}/{key}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        collection: String,
        key: String,
        expected: Version,
        actual: Version,
    },

    /// The document does not exist (or has expired).
    #[error("Document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    /// An atomic adjustment would have moved a counter outside its bounds.
    /// The document is left unchanged.
    #[error("Adjusting {path} on {collection}/{key} by {delta} from {current} violates its bounds")]
    BoundViolation {
        collection: String,
        key: String,
        path: String,
        current: i64,
        delta: i64,
    },

    /// An adjustment's guard field did not hold the expected value.
    /// The document is left unchanged.
    #[error("Guard on {path} failed for {collection}/{key}")]
    GuardMismatch {
        collection: String,
        key: String,
        path: String,
    },

    /// The path does not point at an integer field.
    #[error("Path {path} does not address an integer field on {collection}/{key}")]
    InvalidPath {
        collection: String,
        key: String,
        path: String,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
