//! In-memory credential store for small deployments and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{CredentialStore, UserRecord};
use crate::error::StoreError;
use crate::password::UNUSABLE_PASSWORD;

#[derive(Clone, Debug)]
struct MemoryUser {
    password: String,
    group: String,
    home: String,
}

#[derive(Clone, Debug)]
pub(crate) struct SessionRow {
    pub(crate) user: String,
    /// Absolute epoch seconds; `None` never expires.
    pub(crate) expires_at: Option<i64>,
}

/// Token-capable store backed by two locked maps.
///
/// Lock scopes never cross an await point, so plain `std::sync` locks are
/// enough despite the async trait surface.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, MemoryUser>>,
    sessions: RwLock<HashMap<String, SessionRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding, mostly for tests and demo setups.
    #[must_use]
    pub fn with_user(self, name: &str, password: &str, group: &str, home: &str) -> Self {
        self.insert_user(name, password, group, home);
        self
    }

    pub fn insert_user(&self, name: &str, password: &str, group: &str, home: &str) {
        self.users
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                name.to_string(),
                MemoryUser {
                    password: password.to_string(),
                    group: group.to_string(),
                    home: home.to_string(),
                },
            );
    }

    fn read_users(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, MemoryUser>> {
        self.users
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn insert_session(&self, token: &str, user: &str, expires_at: Option<i64>) {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                token.to_string(),
                SessionRow {
                    user: user.to_string(),
                    expires_at,
                },
            );
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

#[async_trait]
impl CredentialStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn lookup_password(&self, user: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_users().get(user).map(|u| u.password.clone()))
    }

    async fn lookup_group(&self, user: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_users().get(user).map(|u| u.group.clone()))
    }

    async fn lookup_home(&self, user: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_users().get(user).map(|u| u.home.clone()))
    }

    fn supports_tokens(&self) -> bool {
        true
    }

    async fn check_token(
        &self,
        token: &str,
        require_unexpired: bool,
    ) -> Result<Option<String>, StoreError> {
        let sessions = self
            .sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(row) = sessions.get(token) else {
            return Ok(None);
        };
        if require_unexpired {
            let live = match row.expires_at {
                None => true,
                Some(expiry) => expiry > now_epoch(),
            };
            if !live {
                return Ok(None);
            }
        }
        Ok(Some(row.user.clone()))
    }

    async fn issue_token(
        &self,
        user: &str,
        token: &str,
        expire_seconds: i64,
    ) -> Result<(), StoreError> {
        if !self.read_users().contains_key(user) {
            return Err(StoreError::NotFound);
        }
        let expires_at = (expire_seconds > 0).then(|| now_epoch() + expire_seconds);
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One active session per user: drop any row owned by this user or
        // reusing this token value, then insert.
        sessions.retain(|key, row| row.user != user && key != token);
        sessions.insert(
            token.to_string(),
            SessionRow {
                user: user.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn add_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let mut users = self
            .users
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if users.contains_key(&record.name) {
            return Ok(());
        }
        users.insert(
            record.name.clone(),
            MemoryUser {
                password: UNUSABLE_PASSWORD.to_string(),
                group: record.group.clone(),
                home: record.home.clone(),
            },
        );
        Ok(())
    }

    async fn set_password(&self, user: &str, field: &str) -> Result<(), StoreError> {
        let mut users = self
            .users
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match users.get_mut(user) {
            Some(found) => {
                found.password = field.to_string();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn remove_user(&self, user: &str) -> Result<(), StoreError> {
        let mut users = self
            .users
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if users.remove(user).is_none() {
            return Err(StoreError::NotFound);
        }
        drop(users);
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|_, row| row.user != user);
        Ok(())
    }
}
