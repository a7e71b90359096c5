//! Response bodies
//!
//! JSON shapes returned by the HTTP surface, and the rendering of `ServerError`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::DirEntry;
use crate::error::handlers::{error_to_status_code, handle_error};
use crate::error::{ErrorKind, ServerError};
use crate::sandbox::ExecutionResult;
use crate::storage::DeleteReport;
use crate::storage::validation::join_relative;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub kind: &'static str,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = error_to_status_code(&self);

        // Denials already produced their own record.
        if kind != ErrorKind::AdmissionDenied {
            handle_error("Request failed", &self);
        }

        let error = match kind {
            ErrorKind::IoFailure => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error,
            kind: kind.as_str(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub name: String,
    /// Relative to the user directory
    pub path: String,
    pub is_dir: bool,
    pub is_file: bool,
    pub size: Option<u64>,
    pub modified: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
}

impl ItemResponse {
    pub fn from_entry(entry: DirEntry, base: &str, with_depth: bool) -> Self {
        Self {
            path: join_relative(base, &entry.relative_path),
            name: entry.name,
            is_dir: entry.is_directory,
            is_file: entry.is_file,
            size: entry.size,
            modified: entry.modified,
            depth: with_depth.then_some(entry.depth),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub items: Vec<ItemResponse>,
    pub path: String,
    pub total_items: usize,
}

impl ListResponse {
    pub fn new(path: String, items: Vec<ItemResponse>) -> Self {
        Self {
            success: true,
            total_items: items.len(),
            items,
            path,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunCodeResponse {
    pub success: bool,
    pub output: String,
    pub error_output: String,
    pub return_code: Option<i32>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunCodeResponse {
    pub fn new(result: ExecutionResult, error: Option<String>) -> Self {
        Self {
            success: result.success,
            output: result.output,
            error_output: result.error_output,
            return_code: result.return_code,
            timed_out: result.timed_out,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>, path: Option<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            path,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteFailureResponse {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub removed: Vec<String>,
    pub remaining: Vec<DeleteFailureResponse>,
}

impl IntoResponse for DeleteResponse {
    fn into_response(self) -> Response {
        let status = if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(self)).into_response()
    }
}

impl From<DeleteReport> for DeleteResponse {
    fn from(report: DeleteReport) -> Self {
        Self {
            success: report.is_complete(),
            removed: report.removed,
            remaining: report
                .remaining
                .into_iter()
                .map(|failure| DeleteFailureResponse {
                    path: failure.path,
                    reason: failure.reason,
                })
                .collect(),
        }
    }
}
