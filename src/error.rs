//! Error types
//!
//! `StorageError` is what engines and cursors return. Every variant maps onto the
//! four-way [`ErrorKind`] taxonomy callers branch on; `Corruption` in particular
//! means the local cache should be discarded and rebuilt from the remote source.

use thiserror::Error;

/// Coarse error classification surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Corruption,
    IoError,
    Unknown,
}

/// Storage engine errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store corruption: {0}")]
    Corruption(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid node name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Node ID space exhausted")]
    IdSpaceExhausted,

    #[error("Storage engine error: {0}")]
    Unknown(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Corruption(_) => ErrorKind::Corruption,
            StorageError::IoError(_) => ErrorKind::IoError,
            StorageError::InvalidName { .. }
            | StorageError::IdSpaceExhausted
            | StorageError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// True when the store should be thrown away and rebuilt.
    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::Corruption
    }

    pub(crate) fn corruption(message: impl Into<String>) -> Self {
        StorageError::Corruption(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        StorageError::NotFound(message.into())
    }
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(e) => StorageError::IoError(e),
            sled::Error::Corruption { at, .. } => match at {
                Some(ptr) => StorageError::Corruption(format!("sled corruption at {:?}", ptr)),
                None => StorageError::Corruption("sled corruption".to_string()),
            },
            sled::Error::CollectionNotFound(name) => StorageError::NotFound(format!(
                "sled tree {}",
                String::from_utf8_lossy(&name)
            )),
            other => StorageError::Unknown(other.to_string()),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &err {
            rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound(err.to_string()),
            rusqlite::Error::SqliteFailure(code, _) => match code.code {
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    StorageError::Corruption(err.to_string())
                }
                ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly
                | ErrorCode::FileLockingProtocolFailed => StorageError::IoError(
                    std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
                ),
                _ => StorageError::Unknown(err.to_string()),
            },
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => StorageError::Corruption(err.to_string()),
            _ => StorageError::Unknown(err.to_string()),
        }
    }
}

/// Errors from the archive transcoding collaborator
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Malformed archive: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported archive version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Invalid node in archive: {0}")]
    InvalidNode(String),
}

/// Errors at the configuration / tooling boundary
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] ArchiveError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
