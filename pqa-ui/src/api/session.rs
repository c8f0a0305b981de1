//! Annotation session endpoints
//!
//! Every handler returns the refreshed [`SessionView`], so the page can be
//! re-rendered from a single response. Field mutations carry the outcome of
//! the recovery-file write in `last_local_save`.

use axum::{
    extract::{Path, State},
    Json,
};
use pqa_common::record::ItemFeedbackField;
use pqa_common::session::{SessionView, SubmitReceipt};
use pqa_common::{Dimension, Rank, Score, SessionId, Slot};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::sessions::SharedSession;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub annotator_id: String,
    /// Resume an earlier session instead of starting a new one
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub slot: u8,
    pub dimension: String,
    pub score: u8,
}

#[derive(Debug, Deserialize)]
pub struct RankRequest {
    pub slot: u8,
    /// `null` clears the rank
    pub rank: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct ItemFeedbackRequest {
    pub field: ItemFeedbackField,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowFeedbackRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct InstructionsRequest {
    pub expanded: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub receipt: SubmitReceipt,
    pub session: SessionView,
}

/// Resolve path segments to a live or recoverable session
///
/// Unknown tokens are 404; sessions are created only through sign-in.
async fn session_for(state: &AppState, annotator: &str, session: &str) -> ApiResult<SharedSession> {
    let annotator = state.roster.resolve(annotator)?;
    let session_id = SessionId::parse(session)?;
    state
        .sessions
        .existing(state, annotator, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {}", session)))
}

fn parse_slot(number: u8) -> ApiResult<Slot> {
    Slot::new(number)
        .ok_or_else(|| ApiError::BadRequest(format!("slot must be 1-4 (got {})", number)))
}

/// POST /api/sessions
///
/// Identity entry. Without `session_id` a fresh token is generated.
pub async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> ApiResult<Json<SessionView>> {
    let annotator = state.roster.resolve(&request.annotator_id)?;
    let session_id = match request.session_id.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => SessionId::parse(raw)?,
        _ => SessionId::generate(&annotator),
    };
    info!(annotator = %annotator, session = %session_id, "Annotator signed in");

    let shared = state
        .sessions
        .open_or_get(&state, annotator, session_id)
        .await;
    let session = shared.lock().await;
    Ok(Json(session.view(&state.catalog)))
}

/// GET /api/sessions/:annotator/:session
pub async fn get_session(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
) -> ApiResult<Json<SessionView>> {
    let shared = session_for(&state, &annotator, &session).await?;
    let session = shared.lock().await;
    Ok(Json(session.view(&state.catalog)))
}

/// PUT /api/sessions/:annotator/:session/rating
pub async fn set_rating(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
    Json(request): Json<RatingRequest>,
) -> ApiResult<Json<SessionView>> {
    let slot = parse_slot(request.slot)?;
    let dimension = Dimension::from_label(&request.dimension)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown dimension '{}'", request.dimension)))?;
    let score = Score::new(request.score)
        .ok_or_else(|| ApiError::BadRequest(format!("score must be 1-4 (got {})", request.score)))?;

    let shared = session_for(&state, &annotator, &session).await?;
    let mut session = shared.lock().await;
    session.set_rating(slot, dimension, score).await?;
    Ok(Json(session.view(&state.catalog)))
}

/// PUT /api/sessions/:annotator/:session/rank
pub async fn set_rank(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
    Json(request): Json<RankRequest>,
) -> ApiResult<Json<SessionView>> {
    let slot = parse_slot(request.slot)?;
    let rank = match request.rank {
        Some(value) => Some(
            Rank::new(value)
                .ok_or_else(|| ApiError::BadRequest(format!("rank must be 1-4 (got {})", value)))?,
        ),
        None => None,
    };

    let shared = session_for(&state, &annotator, &session).await?;
    let mut session = shared.lock().await;
    session.set_rank(slot, rank).await?;
    Ok(Json(session.view(&state.catalog)))
}

/// PUT /api/sessions/:annotator/:session/item-feedback
pub async fn set_item_feedback(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
    Json(request): Json<ItemFeedbackRequest>,
) -> ApiResult<Json<SessionView>> {
    let shared = session_for(&state, &annotator, &session).await?;
    let mut session = shared.lock().await;
    session.set_item_feedback(request.field, request.text).await?;
    Ok(Json(session.view(&state.catalog)))
}

/// PUT /api/sessions/:annotator/:session/workflow-feedback
pub async fn set_workflow_feedback(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
    Json(request): Json<WorkflowFeedbackRequest>,
) -> ApiResult<Json<SessionView>> {
    let shared = session_for(&state, &annotator, &session).await?;
    let mut session = shared.lock().await;
    session.set_workflow_feedback(request.text).await?;
    Ok(Json(session.view(&state.catalog)))
}

/// PUT /api/sessions/:annotator/:session/instructions
pub async fn set_instructions(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
    Json(request): Json<InstructionsRequest>,
) -> ApiResult<Json<SessionView>> {
    let shared = session_for(&state, &annotator, &session).await?;
    let mut session = shared.lock().await;
    session.set_instructions_expanded(request.expanded);
    Ok(Json(session.view(&state.catalog)))
}

/// POST /api/sessions/:annotator/:session/next
pub async fn next_page(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
) -> ApiResult<Json<SessionView>> {
    let shared = session_for(&state, &annotator, &session).await?;
    let mut session = shared.lock().await;
    session.next().await?;
    Ok(Json(session.view(&state.catalog)))
}

/// POST /api/sessions/:annotator/:session/previous
pub async fn previous_page(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
) -> ApiResult<Json<SessionView>> {
    let shared = session_for(&state, &annotator, &session).await?;
    let mut session = shared.lock().await;
    session.previous()?;
    Ok(Json(session.view(&state.catalog)))
}

/// POST /api/sessions/:annotator/:session/jump-to-last-task
pub async fn jump_to_last_task(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
) -> ApiResult<Json<SessionView>> {
    let shared = session_for(&state, &annotator, &session).await?;
    let mut session = shared.lock().await;
    session.jump_to_last_task()?;
    Ok(Json(session.view(&state.catalog)))
}

/// POST /api/sessions/:annotator/:session/submit
pub async fn submit(
    State(state): State<AppState>,
    Path((annotator, session)): Path<(String, String)>,
) -> ApiResult<Json<SubmitResponse>> {
    let shared = session_for(&state, &annotator, &session).await?;
    let mut session = shared.lock().await;
    let receipt = session.submit_all().await?;
    state
        .sessions
        .remove(session.annotator(), session.session_id())
        .await;
    Ok(Json(SubmitResponse {
        receipt,
        session: session.view(&state.catalog),
    }))
}
