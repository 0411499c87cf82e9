use snip_core::{CoreError, StorageError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShortenerError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShortenerError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code deleted: {0}")]
    Gone(String),
    #[error("shortener is closed")]
    Closed,
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidShortCode(message) => Self::InvalidShortCode(message),
        }
    }
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(code) => Self::Conflict(code),
            StorageError::NotFound(code) => Self::NotFound(code),
            StorageError::Gone(code) => Self::Gone(code),
            StorageError::Closed => Self::Closed,
            other => Self::Storage(other),
        }
    }
}
