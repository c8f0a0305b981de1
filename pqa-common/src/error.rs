//! Common error types for PQA

use thiserror::Error;

use crate::content::ContentError;
use crate::identity::IdentityError;
use crate::persistence::StoreError;

/// Common result type for PQA operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type, used mostly at startup
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reference content could not be loaded
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    /// Annotator or session identity rejected
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Persistence backend failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
