//! HTTP protocol implementation
//!
//! Routes, request decoding and response rendering.

pub mod handlers;
pub mod requests;
pub mod responses;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use std::sync::Arc;

use crate::middleware::{AdmissionPolicy, admission_gate, log_requests};

pub use handlers::AppState;

/// Builds the application router.
///
/// Everything under `/mcp_api` sits behind the admission gate; everything under
/// `/api/files` requires an authenticated caller.
pub fn router(state: AppState, policy: Arc<AdmissionPolicy>, max_body_bytes: usize) -> Router {
    let mcp = Router::new()
        .route("/run_code", post(handlers::run_code))
        .route("/run_python_code", post(handlers::run_code))
        .route("/list_dir", post(handlers::list_dir))
        .route("/list_dir_recursively", post(handlers::list_dir_recursively))
        .layer(middleware::from_fn_with_state(policy, admission_gate));

    let files = Router::new()
        .route("/list", get(handlers::list_files))
        .route("/upload", post(handlers::upload_file))
        .route("/download", get(handlers::download_file))
        .route("/download-zip", get(handlers::download_zip))
        .route("/create-folder", post(handlers::create_folder))
        .route("/delete", post(handlers::delete_item))
        .route("/rename", post(handlers::rename_item))
        .route("/move", post(handlers::move_item))
        .route("/copy", post(handlers::copy_item));

    Router::new()
        .nest("/mcp_api", mcp)
        .nest("/api/files", files)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}
