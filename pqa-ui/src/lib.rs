//! pqa-ui library - annotation web service
//!
//! Operator surface for the paragraph quality annotation workflow: identity
//! entry, task pages, final submission, plus an admin view over the local
//! recovery files.

use axum::Router;
use pqa_common::content::ContentCatalog;
use pqa_common::session::SessionStores;
use pqa_common::AnnotatorRoster;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod sessions;

pub use sessions::SessionRegistry;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Reference content, read-only after startup
    pub catalog: Arc<ContentCatalog>,
    pub roster: Arc<AnnotatorRoster>,
    pub prompts_per_annotator: usize,
    pub stores: SessionStores,
    /// Live sessions keyed by (annotator, session)
    pub sessions: SessionRegistry,
    /// `None` disables the admin routes
    pub admin_secret: Option<String>,
}

impl AppState {
    pub fn new(
        catalog: ContentCatalog,
        roster: AnnotatorRoster,
        prompts_per_annotator: usize,
        stores: SessionStores,
        admin_secret: Option<String>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            roster: Arc::new(roster),
            prompts_per_annotator,
            stores,
            sessions: SessionRegistry::default(),
            admin_secret,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post, put};

    let session_routes = Router::new()
        .route("/api/sessions", post(api::start_session))
        .route("/api/sessions/:annotator/:session", get(api::get_session))
        .route("/api/sessions/:annotator/:session/rating", put(api::set_rating))
        .route("/api/sessions/:annotator/:session/rank", put(api::set_rank))
        .route(
            "/api/sessions/:annotator/:session/item-feedback",
            put(api::set_item_feedback),
        )
        .route(
            "/api/sessions/:annotator/:session/workflow-feedback",
            put(api::set_workflow_feedback),
        )
        .route(
            "/api/sessions/:annotator/:session/instructions",
            put(api::set_instructions),
        )
        .route("/api/sessions/:annotator/:session/next", post(api::next_page))
        .route(
            "/api/sessions/:annotator/:session/previous",
            post(api::previous_page),
        )
        .route(
            "/api/sessions/:annotator/:session/jump-to-last-task",
            post(api::jump_to_last_task),
        )
        .route("/api/sessions/:annotator/:session/submit", post(api::submit));

    // Admin routes (shared secret in the query string)
    let admin = Router::new()
        .route("/admin/recovery", get(api::list_recovery_files))
        .route(
            "/admin/recovery/:file",
            get(api::download_recovery_file).delete(api::delete_recovery_file),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::admin_guard,
        ));

    // Public routes
    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .merge(api::health_routes());

    Router::new()
        .merge(session_routes)
        .merge(admin)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the service socket; `host` may be an IP literal or a host name
pub async fn bind_listener(host: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((host, port)).await
}
