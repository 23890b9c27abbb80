//! Error types for the tool registry.

use std::path::PathBuf;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Tool name rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("Tool name cannot be empty")]
    EmptyName,

    #[error("Tool name can only contain letters, numbers, hyphens (-), and underscores (_)")]
    InvalidCharacters,

    #[error("Tool name must be 64 characters or less")]
    NameTooLong,
}

/// Source directory rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Source directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Source path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Invalid path: {} ({reason})", .path.display())]
    InvalidPath { path: PathBuf, reason: String },
}

/// Failure inside the embedded store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A per-tool table that should exist is gone (tool torn down).
    #[error("Table '{0}' does not exist")]
    MissingTable(String),

    /// A row references a parent row that does not exist.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Text that should have been a tool id was not a plain integer.
    #[error("Invalid table identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid chunk span: start {start} must be less than end {end}")]
    InvalidSpan { start: u64, end: u64 },
}

/// Error returned by [`crate::registry::ToolRegistry`] operations.
///
/// A missing tool is not an error: lookups return `None` and mutations
/// return `false`.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("Tool '{0}' already exists")]
    AlreadyExists(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl RegistryError {
    /// Whether this error comes from validating caller input rather than
    /// from the store.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
