//! Admin view over local recovery files
//!
//! Lets an operator fetch or remove the crash-recovery files of
//! sessions that never reached submission. Every route requires
//! `?secret=<admin_secret>`; with no secret configured the routes do not
//! exist as far as clients can tell (404).

use axum::{
    extract::{Path, Query, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use pqa_common::persistence::RecoveryFileInfo;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecoveryListResponse {
    pub directory: String,
    pub files: Vec<RecoveryFileInfo>,
}

/// Shared-secret check for the admin routes
pub async fn admin_guard(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_secret.as_deref() else {
        return Err(ApiError::NotFound(request.uri().path().to_string()));
    };

    if query.secret.as_deref() != Some(expected) {
        warn!(path = %request.uri().path(), "Admin request with wrong or missing secret");
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(request).await)
}

/// GET /admin/recovery
pub async fn list_recovery_files(
    State(state): State<AppState>,
) -> ApiResult<Json<RecoveryListResponse>> {
    let files = state.stores.local.list().await?;
    Ok(Json(RecoveryListResponse {
        directory: state.stores.local.dir().display().to_string(),
        files,
    }))
}

/// GET /admin/recovery/:file
pub async fn download_recovery_file(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    let body = state
        .stores
        .local
        .read_named(&file)
        .await?
        .ok_or_else(|| ApiError::NotFound(file.clone()))?;

    let disposition = format!("attachment; filename=\"{}\"", file);
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// DELETE /admin/recovery/:file
pub async fn delete_recovery_file(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.stores.local.delete_named(&file).await? {
        return Err(ApiError::NotFound(file));
    }
    info!(file = %file, "Recovery file deleted by admin");
    Ok(Json(serde_json::json!({ "deleted": file })))
}
