//! HTTP API handlers for pqa-ui

pub mod admin;
pub mod health;
pub mod session;
pub mod ui;

pub use admin::{admin_guard, delete_recovery_file, download_recovery_file, list_recovery_files};
pub use health::health_routes;
pub use session::{
    get_session, jump_to_last_task, next_page, previous_page, set_instructions,
    set_item_feedback, set_rank, set_rating, set_workflow_feedback, start_session, submit,
};
pub use ui::{serve_app_js, serve_index};
