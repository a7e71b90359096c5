//! Authentication system
//!
//! Resolves file-management callers to the user directory they own.

pub mod credentials;
pub mod results;
pub mod validator;

pub use credentials::CredentialStore;
pub use results::UserIdentity;
pub use validator::{Authenticator, StaticCredentials, bearer_token};
