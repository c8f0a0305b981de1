//! Serializable snapshot of a session for the operator surface

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{AnnotationSession, DisplayPreferences, LocalSave, Page};
use crate::content::ContentCatalog;
use crate::record::{Dimension, ItemAnnotation, ItemKey, Slot};

#[derive(Debug, Clone, Serialize)]
pub struct PassageView {
    pub slot: u8,
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageView {
    Task {
        /// 1-based, for "Task i of N"
        number: usize,
        item: ItemKey,
        passages: Vec<PassageView>,
        annotation: ItemAnnotation,
        complete: bool,
    },
    Feedback {
        workflow_feedback: String,
        session_complete: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub annotator_id: String,
    pub session_id: String,
    pub total_tasks: usize,
    pub page: PageView,
    pub dimensions: Vec<&'static str>,
    pub display: DisplayPreferences,
    pub restored_at: Option<DateTime<Utc>>,
    pub restore_warning: Option<String>,
    pub last_local_save: Option<LocalSave>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl AnnotationSession {
    /// Snapshot of the current page, with passage texts from `catalog`
    pub fn view(&self, catalog: &ContentCatalog) -> SessionView {
        let page = match self.page() {
            Page::Task { index } => {
                let item = self.tasks[index].clone();
                let passages = catalog
                    .get(&item)
                    .map(|content| {
                        Slot::ALL
                            .into_iter()
                            .zip(&content.passages)
                            .map(|(slot, passage)| PassageView {
                                slot: slot.number(),
                                label: slot.label(),
                                text: passage.text.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let annotation = self.record.get(&item).cloned().unwrap_or_default();
                PageView::Task {
                    number: index + 1,
                    complete: annotation.is_complete(),
                    item,
                    passages,
                    annotation,
                }
            }
            Page::Feedback => PageView::Feedback {
                workflow_feedback: self.record.workflow_feedback.clone(),
                session_complete: self.is_session_complete(),
            },
        };

        SessionView {
            annotator_id: self.annotator.to_string(),
            session_id: self.session_id.to_string(),
            total_tasks: self.tasks.len(),
            page,
            dimensions: Dimension::ALL.iter().map(Dimension::label).collect(),
            display: self.display,
            restored_at: self.restored_at,
            restore_warning: self.restore_warning.clone(),
            last_local_save: self.last_local_save.clone(),
            submitted_at: self.submitted_at,
        }
    }
}
