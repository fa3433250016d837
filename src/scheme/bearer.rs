//! Bearer token authentication (RFC 6750) over session-capable stores.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

use super::{Authenticator, Challenge};
use crate::store::CredentialStore;

pub struct BearerAuthenticator {
    realm: Option<String>,
    allow_expired: bool,
    store: Arc<dyn CredentialStore>,
}

impl BearerAuthenticator {
    pub fn new(
        realm: Option<String>,
        allow_expired: bool,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            realm,
            allow_expired,
            store,
        }
    }
}

#[async_trait]
impl Authenticator for BearerAuthenticator {
    fn scheme_name(&self) -> &'static str {
        "Bearer"
    }

    fn challenge(&self) -> Challenge {
        let value = match self.realm.as_deref() {
            Some(realm) if !realm.is_empty() => format!("Bearer realm=\"{realm}\""),
            _ => "Bearer".to_string(),
        };
        Challenge::Unauthorized {
            www_authenticate: vec![value],
        }
    }

    async fn check(&mut self, _method: &str, _uri: &str, credential: &str) -> Option<String> {
        let token = credential.strip_prefix("Bearer ").unwrap_or(credential).trim();
        if token.is_empty() {
            return None;
        }
        match self.store.check_token(token, true).await {
            Ok(Some(user)) => return Some(user),
            Ok(None) => {}
            Err(err) => {
                error!("auth: backend failure during Bearer check: {err}");
                return None;
            }
        }
        if !self.allow_expired {
            return None;
        }
        // Expired sessions stay acceptable only when configured; the match
        // is logged so the operator can see the laxness being used.
        match self.store.check_token(token, false).await {
            Ok(Some(user)) => {
                warn!("auth: accepted expired token for {user}");
                Some(user)
            }
            Ok(None) => None,
            Err(err) => {
                error!("auth: backend failure during expired-token check: {err}");
                None
            }
        }
    }
}
