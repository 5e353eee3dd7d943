use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;

/// Coarse classification callers branch on, independent of the concrete cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    RelationshipConflict,
    InvalidRequest,
    StoreUnavailable,
}

#[derive(Debug, Error)]
pub enum AppError {

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Already Exists: {0}")]
    AlreadyExists(String),

    #[error("Relationship conflict: {0}")]
    RelationshipConflict(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Join: {0}")]
    JoinError(#[from] JoinError),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_)             => ErrorKind::NotFound,
            AppError::AlreadyExists(_)        => ErrorKind::AlreadyExists,
            AppError::RelationshipConflict(_) => ErrorKind::RelationshipConflict,
            AppError::InvalidRequest(_)       => ErrorKind::InvalidRequest,
            _                                 => ErrorKind::StoreUnavailable,
        }
    }

    /// Only store failures may be retried, the mutation may or may not have been applied.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StoreUnavailable
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("{} with id {} does not exist", what, id))
    }
}
