//! Session/navigation controller
//!
//! Linear state machine over pages `0..=N`: pages `0..N` are the assigned
//! tasks, page `N` is the closing feedback page.
//!
//! - `next` is gated on the current task being complete (ranks form a
//!   permutation of 1..=4) and saves to the local recovery file.
//! - `previous` is unconditional apart from page 0.
//! - `jump_to_last_task` goes from the feedback page straight to page `N-1`.
//! - `submit_all` re-validates every task, writes the durable row, then
//!   deletes the recovery file.
//!
//! Every field mutation is written through to the recovery file before the
//! call returns. A failed local write is reported, never fatal: the change
//! stays in memory and is retried with the next save.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::identity::{AnnotatorId, SessionId};
use crate::persistence::{DurableStore, LocalRecoveryStore, StoreError, Upsert};
use crate::record::{
    Dimension, ItemDefect, ItemFeedbackField, ItemKey, Rank, Score, SessionRecord, Slot,
};

mod view;

pub use view::{PageView, PassageView, SessionView};

/// Both persistence sinks, shared by every session
#[derive(Clone)]
pub struct SessionStores {
    pub local: LocalRecoveryStore,
    pub durable: DurableStore,
}

/// Where the annotator currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Page {
    /// 0-based index into the task list
    Task { index: usize },
    Feedback,
}

/// Rejected transitions and mutations; state is unchanged when returned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavError {
    #[error("Please assign a rank to every paragraph ({item}).")]
    Incomplete { item: ItemKey },

    #[error("Duplicate ranks detected ({item}).")]
    DuplicateRank { item: ItemKey },

    #[error("Already on the first page")]
    AtFirstPage,

    #[error("This action is only available on a task page")]
    NotOnTaskPage,

    #[error("This action is only available on the feedback page")]
    NotOnFeedbackPage,

    #[error("No tasks are assigned to this annotator")]
    NoTasksAssigned,
}

impl NavError {
    fn from_defect(item: ItemKey, defect: ItemDefect) -> Self {
        match defect {
            ItemDefect::MissingRank => NavError::Incomplete { item },
            ItemDefect::DuplicateRank => NavError::DuplicateRank { item },
        }
    }
}

/// Failure of `submit_all`
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] NavError),

    #[error("Submission could not be saved: {0}")]
    Durable(StoreError),
}

/// Result of the latest write to the recovery file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocalSave {
    Saved { at: DateTime<Utc> },
    Failed { reason: String },
}

impl LocalSave {
    pub fn is_saved(&self) -> bool {
        matches!(self, LocalSave::Saved { .. })
    }
}

/// Successful submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub submitted_at: DateTime<Utc>,
    pub replaced_previous: bool,
}

/// Per-session display preferences; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayPreferences {
    pub instructions_expanded: bool,
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        Self {
            instructions_expanded: true,
        }
    }
}

/// One annotator's live session
pub struct AnnotationSession {
    annotator: AnnotatorId,
    session_id: SessionId,
    tasks: Vec<ItemKey>,
    page: usize,
    record: SessionRecord,
    display: DisplayPreferences,
    restored_at: Option<DateTime<Utc>>,
    restore_warning: Option<String>,
    last_local_save: Option<LocalSave>,
    submitted_at: Option<DateTime<Utc>>,
    stores: SessionStores,
}

impl AnnotationSession {
    /// Start or resume a session
    ///
    /// A recovery file for the pair replaces the fresh record wholesale. An
    /// unreadable file becomes a warning and the session starts empty.
    pub async fn open(
        annotator: AnnotatorId,
        session_id: SessionId,
        tasks: Vec<ItemKey>,
        stores: SessionStores,
    ) -> Self {
        let mut session = Self {
            annotator,
            session_id,
            tasks,
            page: 0,
            record: SessionRecord::new(),
            display: DisplayPreferences::default(),
            restored_at: None,
            restore_warning: None,
            last_local_save: None,
            submitted_at: None,
            stores,
        };

        match session
            .stores
            .local
            .load(&session.annotator, &session.session_id)
            .await
        {
            Ok(Some(record)) => {
                info!(
                    annotator = %session.annotator,
                    session = %session.session_id,
                    last_saved = ?record.last_saved,
                    "Restored session from recovery file"
                );
                session.restored_at = record.last_saved;
                session.record = record;
            }
            Ok(None) => {
                debug!(session = %session.session_id, "No recovery file; starting fresh");
            }
            Err(e) => {
                warn!(
                    annotator = %session.annotator,
                    session = %session.session_id,
                    error = %e,
                    "Failed to load saved annotations"
                );
                session.restore_warning = Some(format!("Failed to load saved annotations: {}", e));
            }
        }

        session.touch_current();
        session
    }

    pub fn annotator(&self) -> &AnnotatorId {
        &self.annotator
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn tasks(&self) -> &[ItemKey] {
        &self.tasks
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn page(&self) -> Page {
        if self.page < self.tasks.len() {
            Page::Task { index: self.page }
        } else {
            Page::Feedback
        }
    }

    pub fn current_task(&self) -> Option<&ItemKey> {
        self.tasks.get(self.page)
    }

    pub fn display(&self) -> DisplayPreferences {
        self.display
    }

    pub fn restored_at(&self) -> Option<DateTime<Utc>> {
        self.restored_at
    }

    pub fn restore_warning(&self) -> Option<&str> {
        self.restore_warning.as_deref()
    }

    pub fn last_local_save(&self) -> Option<&LocalSave> {
        self.last_local_save.as_ref()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn is_session_complete(&self) -> bool {
        self.record.is_session_complete(self.tasks.iter())
    }

    // ---------------------------------------------------------------------
    // Field mutations (write-through)
    // ---------------------------------------------------------------------

    pub async fn set_rating(
        &mut self,
        slot: Slot,
        dimension: Dimension,
        score: Score,
    ) -> Result<LocalSave, NavError> {
        let key = self.current_task().cloned().ok_or(NavError::NotOnTaskPage)?;
        self.record.set_rating(&key, slot, dimension, score);
        Ok(self.persist_local().await)
    }

    pub async fn set_rank(&mut self, slot: Slot, rank: Option<Rank>) -> Result<LocalSave, NavError> {
        let key = self.current_task().cloned().ok_or(NavError::NotOnTaskPage)?;
        self.record.set_rank(&key, slot, rank);
        Ok(self.persist_local().await)
    }

    pub async fn set_item_feedback(
        &mut self,
        field: ItemFeedbackField,
        text: String,
    ) -> Result<LocalSave, NavError> {
        let key = self.current_task().cloned().ok_or(NavError::NotOnTaskPage)?;
        self.record.set_item_feedback(&key, field, text);
        Ok(self.persist_local().await)
    }

    pub async fn set_workflow_feedback(&mut self, text: String) -> Result<LocalSave, NavError> {
        if self.page() != Page::Feedback {
            return Err(NavError::NotOnFeedbackPage);
        }
        self.record.set_workflow_feedback(text);
        Ok(self.persist_local().await)
    }

    /// Manual show/hide of the instructions panel
    pub fn set_instructions_expanded(&mut self, expanded: bool) {
        self.display.instructions_expanded = expanded;
    }

    // ---------------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------------

    pub async fn next(&mut self) -> Result<LocalSave, NavError> {
        let key = self.current_task().cloned().ok_or(NavError::NotOnTaskPage)?;
        self.record
            .check_item(&key)
            .map_err(|defect| NavError::from_defect(key, defect))?;

        self.page += 1;
        // Collapses once; only a manual toggle re-expands it
        self.display.instructions_expanded = false;
        self.touch_current();
        debug!(session = %self.session_id, page = self.page, "Advanced to next page");
        Ok(self.persist_local().await)
    }

    pub fn previous(&mut self) -> Result<(), NavError> {
        if self.page == 0 {
            return Err(NavError::AtFirstPage);
        }
        self.page -= 1;
        self.touch_current();
        Ok(())
    }

    pub fn jump_to_last_task(&mut self) -> Result<(), NavError> {
        if self.page() != Page::Feedback {
            return Err(NavError::NotOnFeedbackPage);
        }
        if self.tasks.is_empty() {
            return Err(NavError::NoTasksAssigned);
        }
        self.page = self.tasks.len() - 1;
        Ok(())
    }

    /// Validate every task, write the durable row, drop the recovery file
    pub async fn submit_all(&mut self) -> Result<SubmitReceipt, SubmitError> {
        if self.page() != Page::Feedback {
            return Err(NavError::NotOnFeedbackPage.into());
        }
        if let Some((item, defect)) = self.record.first_defect(self.tasks.iter()) {
            return Err(NavError::from_defect(item, defect).into());
        }

        let receipt = self
            .stores
            .durable
            .save(&self.annotator, &self.session_id, &self.record)
            .await
            .map_err(|e| {
                warn!(
                    annotator = %self.annotator,
                    session = %self.session_id,
                    error = %e,
                    "Submission failed; recovery file kept"
                );
                SubmitError::Durable(e)
            })?;

        self.record.last_saved = Some(receipt.saved_at);
        self.submitted_at = Some(receipt.saved_at);

        if let Err(e) = self
            .stores
            .local
            .delete(&self.annotator, &self.session_id)
            .await
        {
            warn!(session = %self.session_id, error = %e, "Could not remove recovery file");
        }

        info!(
            annotator = %self.annotator,
            session = %self.session_id,
            tasks = self.tasks.len(),
            "Session submitted"
        );
        Ok(SubmitReceipt {
            submitted_at: receipt.saved_at,
            replaced_previous: receipt.upsert == Upsert::Updated,
        })
    }

    /// Make sure the current task has an annotation to show
    fn touch_current(&mut self) {
        if let Some(key) = self.tasks.get(self.page).cloned() {
            self.record.get_or_create(&key);
        }
    }

    async fn persist_local(&mut self) -> LocalSave {
        let outcome = match self
            .stores
            .local
            .save(&self.annotator, &self.session_id, &self.record)
            .await
        {
            Ok(at) => {
                self.record.last_saved = Some(at);
                LocalSave::Saved { at }
            }
            Err(e) => {
                warn!(
                    session = %self.session_id,
                    error = %e,
                    "Recovery file not updated; changes are not yet recoverable"
                );
                LocalSave::Failed {
                    reason: e.to_string(),
                }
            }
        };
        self.last_local_save = Some(outcome.clone());
        outcome
    }
}
