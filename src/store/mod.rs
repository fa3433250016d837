//! Credential stores: username -> password/group/home plus session tokens.
//!
//! One store instance is shared by every connection of a server, so each
//! backend must be safe under concurrent calls. Per-connection state lives
//! in the scheme engines, never here.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::password;

mod file;
mod memory;
mod sqlite;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A user row as handed to management operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub group: String,
    pub home: String,
}

/// Backend contract over user, group, and session/token records.
///
/// Lookup methods answer `Ok(None)` for unknown users; `Err` is reserved for
/// backend trouble (I/O, database) and is logged distinctly by callers. Both
/// outcomes read as "authentication denied" from the outside.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Backend label used in creation-failure logs.
    fn backend_name(&self) -> &'static str;

    /// Stored password field, plain or `$tag$...`-tagged.
    async fn lookup_password(&self, user: &str) -> Result<Option<String>, StoreError>;

    async fn lookup_group(&self, user: &str) -> Result<Option<String>, StoreError>;

    async fn lookup_home(&self, user: &str) -> Result<Option<String>, StoreError>;

    /// Plain user/password verification, sharing the tagged-hash logic with
    /// the Digest A1 path.
    async fn check(&self, user: &str, passwd: &str) -> Result<bool, StoreError> {
        match self.lookup_password(user).await? {
            Some(field) => Ok(password::verify(user, &field, passwd)),
            None => Ok(false),
        }
    }

    /// Whether this backend persists session tokens at all. Token schemes
    /// refuse to start against a store that answers `false`.
    fn supports_tokens(&self) -> bool {
        false
    }

    /// Whether passwords can be looked up for digest computation. True for
    /// every shipped backend; pure token stores may answer `false`.
    fn supports_passwords(&self) -> bool {
        true
    }

    /// Resolve a session token to its owning username.
    ///
    /// With `require_unexpired` a row matches when its expiry is NULL or in
    /// the future; without it any row matches regardless of expiry. Callers
    /// gate the permissive variant behind explicit configuration.
    async fn check_token(
        &self,
        _token: &str,
        _require_unexpired: bool,
    ) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    /// Replace the user's session with a fresh token. `expire_seconds > 0`
    /// sets an absolute expiry, anything else stores a never-expiring row.
    /// The delete+insert pair is atomic per backend.
    async fn issue_token(
        &self,
        _user: &str,
        _token: &str,
        _expire_seconds: i64,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend(
            "backend does not support session tokens".to_string(),
        ))
    }

    /// Idempotent user provisioning with the unusable `"*"` placeholder
    /// password; token-provisioned accounts cannot log in by password until
    /// one is set explicitly.
    async fn add_user(&self, record: &UserRecord) -> Result<(), StoreError>;

    /// Management mutation: replace the stored password field (plain or
    /// pre-tagged by the management tooling).
    async fn set_password(&self, user: &str, field: &str) -> Result<(), StoreError>;

    /// Management mutation: drop the user and any session rows.
    async fn remove_user(&self, user: &str) -> Result<(), StoreError>;
}
