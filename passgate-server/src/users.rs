//! User directory module
//!
//! In-memory account directory keyed by username, with a stable UUID per
//! user. The UUID is what the passkey engine and ledger key on; usernames
//! are only an API-surface convenience.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;

/// Accept 3-32 chars of `[a-z0-9_-]`, the same constraint enforced on the
/// client form. Case is normalized by the caller.
pub fn validate_username(username: &str) -> Result<(), ApiError> {
    let ok = (3..=32).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "username must be 3-32 characters of a-z, 0-9, '_' or '-'",
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// Username -> user record map.
#[derive(Default)]
pub struct UserDirectory {
    users: DashMap<String, UserRecord>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an existing user or mint one. Registration is the only entry
    /// point that creates accounts, so this lives on the register path.
    pub fn get_or_create(&self, username: &str, display_name: &str) -> UserRecord {
        self.users
            .entry(username.to_owned())
            .or_insert_with(|| {
                let record = UserRecord {
                    id: Uuid::new_v4(),
                    username: username.to_owned(),
                    display_name: display_name.to_owned(),
                    created_at: Utc::now(),
                };
                tracing::info!(user_id = %record.id, username, "user created");
                record
            })
            .clone()
    }

    pub fn find(&self, username: &str) -> Option<UserRecord> {
        self.users.get(username).map(|u| u.clone())
    }

    /// As [`find`], but surfacing the API-level 404.
    ///
    /// [`find`]: Self::find
    pub fn require(&self, username: &str) -> Result<UserRecord, ApiError> {
        self.find(username)
            .ok_or_else(|| ApiError::not_found(format!("no such user: {username}")))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
