//! Request handlers
//!
//! Thin adapters from HTTP to the catalog, storage and sandbox engines.
//! Filesystem work runs on the blocking pool.

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use log::info;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::{Authenticator, UserIdentity};
use crate::catalog;
use crate::error::ServerError;
use crate::protocol::requests::{
    CreateFolderRequest, DeleteRequest, ListDirRequest, PathQuery, RelocateRequest,
    RenameRequest, RunCodeRequest, UploadQuery, ValidatedJson, ValidatedQuery,
};
use crate::protocol::responses::{
    DeleteResponse, ItemResponse, ListResponse, MessageResponse, RunCodeResponse,
};
use crate::sandbox::SandboxExecutor;
use crate::storage::validation::{UserRoot, join_relative, normalize};
use crate::storage;

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub storage_root: Arc<PathBuf>,
    pub executor: SandboxExecutor,
    pub authenticator: Arc<dyn Authenticator>,
}

/// An authenticated file-management caller
#[derive(Debug, Clone)]
pub struct Authenticated(pub UserIdentity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .authenticator
            .authenticate(&parts.headers)
            .map(Authenticated)
            .map_err(ServerError::from)
    }
}

async fn blocking<T, F>(task: F) -> Result<T, ServerError>
where
    F: FnOnce() -> Result<T, ServerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await?
}

/// Opens the caller's directory, creating it on first access.
fn user_root(state: &AppState, identity: &UserIdentity) -> Result<UserRoot, ServerError> {
    Ok(UserRoot::provision(&state.storage_root, &identity.dir_name)?)
}

fn attachment(body: Vec<u8>, content_type: &'static str, filename: &str) -> Response {
    let safe: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(body),
    )
        .into_response()
}

// ─── Execution and listing endpoints ───

pub async fn run_code(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RunCodeRequest>,
) -> Result<Json<RunCodeResponse>, ServerError> {
    info!("Executing code for user_dir {}", request.user_dir);

    let storage_root = state.storage_root.clone();
    let user_dir = request.user_dir.clone();
    let root = blocking(move || Ok(UserRoot::open(&storage_root, &user_dir)?)).await?;

    let result = state.executor.execute(&root, &request.code).await?;
    let error = result.timeout_message(state.executor.timeout());
    Ok(Json(RunCodeResponse::new(result, error)))
}

pub async fn list_dir(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ListDirRequest>,
) -> Result<Json<ListResponse>, ServerError> {
    info!(
        "Listing directory for user_dir {}, dir_name {:?}",
        request.user_dir, request.dir_name
    );

    let storage_root = state.storage_root.clone();
    let response = blocking(move || {
        let root = UserRoot::open(&storage_root, &request.user_dir)?;
        let base = normalize(&request.dir_name)?.join("/");
        let items = catalog::list(&root, &request.dir_name)?
            .into_iter()
            .map(|entry| ItemResponse::from_entry(entry, &base, false))
            .collect();
        Ok(ListResponse::new(join_relative(root.name(), &base), items))
    })
    .await?;

    Ok(Json(response))
}

pub async fn list_dir_recursively(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ListDirRequest>,
) -> Result<Json<ListResponse>, ServerError> {
    info!(
        "Listing directory recursively for user_dir {}, dir_name {:?}",
        request.user_dir, request.dir_name
    );

    let storage_root = state.storage_root.clone();
    let response = blocking(move || {
        let root = UserRoot::open(&storage_root, &request.user_dir)?;
        let base = normalize(&request.dir_name)?.join("/");
        let mut items = Vec::new();
        for entry in catalog::list_recursive(&root, &request.dir_name)? {
            items.push(ItemResponse::from_entry(entry?, &base, true));
        }
        Ok(ListResponse::new(join_relative(root.name(), &base), items))
    })
    .await?;

    Ok(Json(response))
}

// ─── File-management endpoints ───

pub async fn list_files(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidatedQuery(query): ValidatedQuery<PathQuery>,
) -> Result<Json<ListResponse>, ServerError> {
    let response = blocking(move || {
        let root = user_root(&state, &identity)?;
        let base = normalize(&query.path)?.join("/");
        let items = catalog::list(&root, &query.path)?
            .into_iter()
            .map(|entry| ItemResponse::from_entry(entry, &base, false))
            .collect();
        Ok(ListResponse::new(base, items))
    })
    .await?;

    Ok(Json(response))
}

pub async fn upload_file(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidatedQuery(query): ValidatedQuery<UploadQuery>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ServerError> {
    let stored = blocking(move || {
        let root = user_root(&state, &identity)?;
        Ok(storage::upload(&root, &query.path, &query.name, &body)?)
    })
    .await?;

    Ok(Json(MessageResponse::ok(
        format!("File uploaded successfully ({} bytes)", stored.size),
        Some(stored.path),
    )))
}

pub async fn download_file(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidatedQuery(query): ValidatedQuery<PathQuery>,
) -> Result<Response, ServerError> {
    let (name, bytes) = blocking(move || {
        let root = user_root(&state, &identity)?;
        let file = storage::download(&root, &query.path)?;
        let bytes = std::fs::read(&file.file_path)?;
        let name = file.path.rsplit('/').next().unwrap_or("download").to_string();
        Ok((name, bytes))
    })
    .await?;

    Ok(attachment(bytes, "application/octet-stream", &name))
}

pub async fn download_zip(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidatedQuery(query): ValidatedQuery<PathQuery>,
) -> Result<Response, ServerError> {
    let (name, bytes) = blocking(move || {
        let root = user_root(&state, &identity)?;
        let mut buffer = Cursor::new(Vec::new());
        storage::archive(&root, &query.path, &mut buffer)?;
        let base = normalize(&query.path)?;
        let name = base.last().map(String::as_str).unwrap_or(root.name());
        Ok((format!("{}.zip", name), buffer.into_inner()))
    })
    .await?;

    Ok(attachment(bytes, "application/zip", &name))
}

pub async fn create_folder(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidatedJson(request): ValidatedJson<CreateFolderRequest>,
) -> Result<Json<MessageResponse>, ServerError> {
    let created = blocking(move || {
        let root = user_root(&state, &identity)?;
        Ok(storage::create_folder(
            &root,
            &request.parent_path,
            &request.folder_name,
        )?)
    })
    .await?;

    Ok(Json(MessageResponse::ok(
        "Folder created successfully",
        Some(created.path),
    )))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidatedJson(request): ValidatedJson<DeleteRequest>,
) -> Result<DeleteResponse, ServerError> {
    let report = blocking(move || {
        let root = user_root(&state, &identity)?;
        Ok(storage::delete(&root, &request.path)?)
    })
    .await?;

    Ok(DeleteResponse::from(report))
}

pub async fn rename_item(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidatedJson(request): ValidatedJson<RenameRequest>,
) -> Result<Json<MessageResponse>, ServerError> {
    let renamed = blocking(move || {
        let root = user_root(&state, &identity)?;
        Ok(storage::rename(&root, &request.old_path, &request.new_name)?)
    })
    .await?;

    Ok(Json(MessageResponse::ok(
        "Item renamed successfully",
        Some(renamed.destination),
    )))
}

pub async fn move_item(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidatedJson(request): ValidatedJson<RelocateRequest>,
) -> Result<Json<MessageResponse>, ServerError> {
    let moved = blocking(move || {
        let root = user_root(&state, &identity)?;
        Ok(storage::move_item(
            &root,
            &request.source_path,
            &request.dest_path,
        )?)
    })
    .await?;

    Ok(Json(MessageResponse::ok(
        "Item moved successfully",
        Some(moved.destination),
    )))
}

pub async fn copy_item(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidatedJson(request): ValidatedJson<RelocateRequest>,
) -> Result<Json<MessageResponse>, ServerError> {
    let copied = blocking(move || {
        let root = user_root(&state, &identity)?;
        Ok(storage::copy_item(
            &root,
            &request.source_path,
            &request.dest_path,
        )?)
    })
    .await?;

    Ok(Json(MessageResponse::ok(
        "Item copied successfully",
        Some(copied.destination),
    )))
}
