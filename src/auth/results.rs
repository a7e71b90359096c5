//! Authentication result types
//!
//! Defines result structures returned by authentication operations.

/// An authenticated caller and the user directory it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
    pub dir_name: String,
}
