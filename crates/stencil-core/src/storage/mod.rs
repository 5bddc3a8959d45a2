//! Persistence of document snapshots.
//!
//! Backends store [`DocumentSnapshot`]s by document id. Loading never hands
//! back a snapshot that fails validation.

mod file;

pub use file::FileStorage;

use crate::error::CanvasError;
use crate::snapshot::DocumentSnapshot;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Invalid document: {0}")]
    Invalid(#[from] CanvasError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A place documents can be saved to and loaded from.
pub trait Storage {
    /// Save a snapshot under `id`, replacing any previous one.
    fn save(&self, id: &str, snapshot: &DocumentSnapshot) -> StorageResult<()>;

    /// Load and validate the snapshot stored under `id`.
    fn load(&self, id: &str) -> StorageResult<DocumentSnapshot>;

    /// Delete a document. Deleting a missing document is not an error.
    fn delete(&self, id: &str) -> StorageResult<()>;

    /// All stored document ids, sorted.
    fn list(&self) -> StorageResult<Vec<String>>;

    fn exists(&self, id: &str) -> StorageResult<bool>;
}
