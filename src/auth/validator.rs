//! Authentication validator
//!
//! Extracts bearer tokens from request headers and checks them against the
//! credential store.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use log::{debug, warn};

use super::credentials::CredentialStore;
use super::results::UserIdentity;
use crate::error::AuthError;
use crate::utils::validation::is_valid_input;

const MAX_TOKEN_LENGTH: usize = 4096;

/// Identifies the caller of a file-management request.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<UserIdentity, AuthError>;
}

/// Authenticator backed by the configured `users` table
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    store: CredentialStore,
}

impl StaticCredentials {
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }
}

impl Authenticator for StaticCredentials {
    fn authenticate(&self, headers: &HeaderMap) -> Result<UserIdentity, AuthError> {
        let token = bearer_token(headers)?;
        match self.store.lookup(token) {
            Some(identity) => {
                debug!("Authenticated {}", identity.username);
                Ok(identity.clone())
            }
            None => {
                warn!("Rejected unknown bearer token");
                Err(AuthError::InvalidToken)
            }
        }
    }
}

/// Reads the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader("non-ASCII authorization header".into()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AuthError::MalformedHeader("expected '<scheme> <token>'".into()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedHeader(format!("unsupported scheme {scheme}")));
    }

    let token = token.trim();
    if !is_valid_input(token, MAX_TOKEN_LENGTH) {
        return Err(AuthError::MalformedHeader("empty or oversized token".into()));
    }
    Ok(token)
}
