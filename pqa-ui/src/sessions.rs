//! Registry of live annotation sessions
//!
//! Each session sits behind its own async mutex, so requests for one session
//! run one at a time while different sessions proceed independently. Only
//! sign-in creates entries. A session not in the registry (e.g. after a
//! restart) is reopened from its recovery file on first access, and a
//! submitted session leaves the registry.

use pqa_common::assignment::task_sequence;
use pqa_common::persistence::StoreError;
use pqa_common::session::AnnotationSession;
use pqa_common::{AnnotatorId, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::AppState;

pub type SharedSession = Arc<Mutex<AnnotationSession>>;

type SessionKey = (AnnotatorId, SessionId);

#[derive(Clone, Default)]
pub struct SessionRegistry {
    live: Arc<Mutex<HashMap<SessionKey, SharedSession>>>,
}

impl SessionRegistry {
    /// Live session for the pair, opening (and restoring) it if needed
    pub async fn open_or_get(
        &self,
        state: &AppState,
        annotator: AnnotatorId,
        session_id: SessionId,
    ) -> SharedSession {
        let key = (annotator, session_id);
        // Held across the open so a pair is never opened twice
        let mut live = self.live.lock().await;
        if let Some(existing) = live.get(&key) {
            return existing.clone();
        }

        let (annotator, session_id) = key.clone();
        let tasks = task_sequence(&annotator, &state.catalog, state.prompts_per_annotator);
        info!(
            annotator = %annotator,
            session = %session_id,
            tasks = tasks.len(),
            "Opening annotation session"
        );
        let session =
            AnnotationSession::open(annotator, session_id, tasks, state.stores.clone()).await;
        let shared = Arc::new(Mutex::new(session));
        live.insert(key, shared.clone());
        shared
    }

    /// Live session for the pair, reopened only if its recovery file exists
    pub async fn existing(
        &self,
        state: &AppState,
        annotator: AnnotatorId,
        session_id: SessionId,
    ) -> Result<Option<SharedSession>, StoreError> {
        let key = (annotator, session_id);
        if let Some(existing) = self.live.lock().await.get(&key) {
            return Ok(Some(existing.clone()));
        }

        let (annotator, session_id) = key;
        if !state.stores.local.exists(&annotator, &session_id).await? {
            return Ok(None);
        }
        Ok(Some(self.open_or_get(state, annotator, session_id).await))
    }

    /// Drop the pair from the registry; in-flight holders keep their handle
    pub async fn remove(&self, annotator: &AnnotatorId, session_id: &SessionId) -> bool {
        let key = (annotator.clone(), session_id.clone());
        let removed = self.live.lock().await.remove(&key).is_some();
        if removed {
            info!(annotator = %annotator, session = %session_id, "Session closed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.live.lock().await.len()
    }
}
