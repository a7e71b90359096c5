//! Credential storage and management
//!
//! Holds the bearer tokens of provisioned accounts, loaded from configuration.

use std::collections::HashMap;

use crate::auth::results::UserIdentity;
use crate::config::UserConfig;

/// Token lookup table; in production this is an external token service
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    by_token: HashMap<String, UserIdentity>,
}

impl CredentialStore {
    pub fn from_users(users: &[UserConfig]) -> Self {
        let by_token = users
            .iter()
            .map(|user| {
                (
                    user.token.clone(),
                    UserIdentity {
                        username: user.username.clone(),
                        dir_name: user.dir_name.clone(),
                    },
                )
            })
            .collect();
        Self { by_token }
    }

    pub fn lookup(&self, token: &str) -> Option<&UserIdentity> {
        self.by_token.get(token)
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}
