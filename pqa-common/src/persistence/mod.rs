//! Persistence adapter
//!
//! Two sinks share one logical contract, upsert by (annotator, session):
//! - [`LocalRecoveryStore`]: one JSON file per session, rewritten on every
//!   change, deleted after a successful submission.
//! - [`DurableStore`]: four-column rows in a remote table (SQLite or a
//!   Google spreadsheet), written at submission time.
//!
//! Both store the same flattened payload produced by [`payload`].

use std::path::PathBuf;
use thiserror::Error;

pub mod durable;
pub mod local;
pub mod payload;
pub mod sheets;
pub mod sqlite;

pub use durable::{AnnotationRow, DurableStore, RowRef, RowStore, Upsert};
pub use local::{LocalRecoveryStore, RecoveryFileInfo};
pub use payload::PayloadError;
pub use sheets::SheetsRowStore;
pub use sqlite::SqliteRowStore;

/// Persistence errors, shared by both sinks
#[derive(Debug, Error)]
pub enum StoreError {
    /// File operation on the recovery directory failed
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Stored payload could not be decoded
    #[error("Stored annotations could not be decoded: {0}")]
    Payload(#[from] PayloadError),

    /// SQLite row store failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Remote spreadsheet failure (network, HTTP status, response shape)
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Admin request named something that is not a recovery file
    #[error("Invalid recovery file name: {0}")]
    InvalidName(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
