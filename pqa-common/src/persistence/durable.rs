//! Durable remote sink
//!
//! A row-oriented table with exactly four columns:
//! `annotator_id | session_id | full_json | timestamp`.
//! [`DurableStore`] implements upsert-by-key on top of any [`RowStore`]:
//! scan for the (annotator, session) pair, overwrite that row in place if
//! present, append otherwise.
//!
//! The scan-then-write is not transactional. Before overwriting, the target
//! row is re-read and the key re-checked; if it moved, the scan is repeated
//! once. A miss is rescanned once right before appending. Two concurrent
//! first submissions of one session can still both append, which backends
//! with a unique index turn into an error instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::{payload, StoreError};
use crate::identity::{AnnotatorId, SessionId};
use crate::record::SessionRecord;

/// Column headers, in order
pub const HEADER: [&str; 4] = ["annotator_id", "session_id", "full_json", "timestamp"];

/// One row of the durable table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRow {
    pub annotator_id: String,
    pub session_id: String,
    pub full_json: String,
    pub timestamp: String,
}

impl AnnotationRow {
    pub fn matches(&self, annotator: &AnnotatorId, session: &SessionId) -> bool {
        self.annotator_id == annotator.as_str() && self.session_id == session.as_str()
    }

    pub fn cells(&self) -> [&str; 4] {
        [
            &self.annotator_id,
            &self.session_id,
            &self.full_json,
            &self.timestamp,
        ]
    }
}

/// Backend-specific row position (spreadsheet row number, database id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowRef(pub u64);

/// Raw row access implemented by each backend
#[async_trait]
pub trait RowStore: Send + Sync {
    /// All data rows in table order (header excluded)
    async fn fetch_rows(&self) -> Result<Vec<(RowRef, AnnotationRow)>, StoreError>;

    /// A single row, `None` if the position no longer holds one
    async fn fetch_row(&self, at: RowRef) -> Result<Option<AnnotationRow>, StoreError>;

    /// Replace all four cells of an existing row
    async fn overwrite_row(&self, at: RowRef, row: &AnnotationRow) -> Result<(), StoreError>;

    async fn append_row(&self, row: &AnnotationRow) -> Result<(), StoreError>;

    /// Short name for logs
    fn backend_name(&self) -> &'static str;
}

/// Which write the upsert performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Updated,
    Appended,
}

/// Outcome of [`DurableStore::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReceipt {
    pub saved_at: DateTime<Utc>,
    pub upsert: Upsert,
}

#[derive(Clone)]
pub struct DurableStore {
    rows: Arc<dyn RowStore>,
}

impl DurableStore {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    pub fn backend_name(&self) -> &'static str {
        self.rows.backend_name()
    }

    /// Upsert the full record; the payload and the timestamp column carry the same stamp
    pub async fn save(
        &self,
        annotator: &AnnotatorId,
        session: &SessionId,
        record: &SessionRecord,
    ) -> Result<SaveReceipt, StoreError> {
        let saved_at = Utc::now();
        let mut snapshot = record.clone();
        snapshot.last_saved = Some(saved_at);

        let row = AnnotationRow {
            annotator_id: annotator.to_string(),
            session_id: session.to_string(),
            full_json: payload::encode(&snapshot)?,
            timestamp: saved_at.to_rfc3339(),
        };

        let target = match self.find(annotator, session).await? {
            Some((at, _)) => self.confirm_target(at, annotator, session).await?,
            None => self.rescan_before_append(annotator, session).await?,
        };

        let upsert = match target {
            Some(at) => {
                self.rows.overwrite_row(at, &row).await?;
                Upsert::Updated
            }
            None => {
                self.rows.append_row(&row).await?;
                Upsert::Appended
            }
        };

        info!(
            backend = self.rows.backend_name(),
            annotator = %annotator,
            session = %session,
            ?upsert,
            "Annotations saved to durable store"
        );
        Ok(SaveReceipt { saved_at, upsert })
    }

    /// `Ok(None)` if no row exists for the pair; decode failures are errors
    pub async fn load(
        &self,
        annotator: &AnnotatorId,
        session: &SessionId,
    ) -> Result<Option<SessionRecord>, StoreError> {
        match self.find(annotator, session).await? {
            Some((_, row)) => Ok(Some(payload::decode(&row.full_json)?)),
            None => Ok(None),
        }
    }

    async fn find(
        &self,
        annotator: &AnnotatorId,
        session: &SessionId,
    ) -> Result<Option<(RowRef, AnnotationRow)>, StoreError> {
        Ok(self
            .rows
            .fetch_rows()
            .await?
            .into_iter()
            .find(|(_, row)| row.matches(annotator, session)))
    }

    /// Second look for the key right before an append
    async fn rescan_before_append(
        &self,
        annotator: &AnnotatorId,
        session: &SessionId,
    ) -> Result<Option<RowRef>, StoreError> {
        let found = self.find(annotator, session).await?.map(|(at, _)| at);
        if let Some(at) = found {
            warn!(
                annotator = %annotator,
                session = %session,
                row = at.0,
                "Durable row appeared after the first scan; overwriting instead of appending"
            );
        }
        Ok(found)
    }

    /// Re-read the row just before writing; rescan once if it no longer holds the key
    async fn confirm_target(
        &self,
        at: RowRef,
        annotator: &AnnotatorId,
        session: &SessionId,
    ) -> Result<Option<RowRef>, StoreError> {
        match self.rows.fetch_row(at).await? {
            Some(current) if current.matches(annotator, session) => Ok(Some(at)),
            _ => {
                warn!(
                    annotator = %annotator,
                    session = %session,
                    row = at.0,
                    "Durable row moved between scan and write; rescanning"
                );
                Ok(self.find(annotator, session).await?.map(|(at, _)| at))
            }
        }
    }
}
