//! Request payloads
//!
//! One strict struct per endpoint. Unknown or missing fields, wrong types and
//! undecodable bodies are all rejected with 400 before any path is resolved.

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::ServerError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunCodeRequest {
    pub user_dir: String,
    #[serde(alias = "python_code")]
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListDirRequest {
    pub user_dir: String,
    #[serde(default)]
    pub dir_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub parent_path: String,
    pub folder_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameRequest {
    pub old_path: String,
    pub new_name: String,
}

/// Body of both move and copy
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelocateRequest {
    pub source_path: String,
    #[serde(default)]
    pub dest_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadQuery {
    #[serde(default)]
    pub path: String,
    pub name: String,
}

/// JSON body extractor whose every rejection is a `MalformedPayload`.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ServerError::MalformedPayload(e.body_text()))?;

        serde_json::from_slice(&bytes)
            .map(ValidatedJson)
            .map_err(|e| ServerError::MalformedPayload(e.to_string()))
    }
}

/// Query-string extractor whose every rejection is a `MalformedPayload`.
#[derive(Debug)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::try_from_uri(&parts.uri)
            .map(|Query(value)| ValidatedQuery(value))
            .map_err(|e| ServerError::MalformedPayload(e.body_text()))
    }
}
