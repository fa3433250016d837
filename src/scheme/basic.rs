//! Basic authentication (RFC 7617): stateless challenge, base64 credential.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::{error, warn};

use super::{Authenticator, Challenge};
use crate::store::CredentialStore;

/// Decoded `user:password` pairs are capped at this size; anything larger
/// is rejected outright rather than truncated.
const MAX_DECODED: usize = 256;

pub struct BasicAuthenticator {
    realm: Option<String>,
    store: Arc<dyn CredentialStore>,
}

impl BasicAuthenticator {
    pub fn new(realm: Option<String>, store: Arc<dyn CredentialStore>) -> Self {
        Self { realm, store }
    }

    /// Split a credential value into `(user, password)`.
    ///
    /// The decode buffer is stack-local and fixed-size; concurrent checks
    /// never share scratch space.
    fn decode(credential: &str) -> Option<(String, String)> {
        let encoded = credential.strip_prefix("Basic ").unwrap_or(credential).trim();

        let mut buffer = [0u8; MAX_DECODED];
        let length = match STANDARD.decode_slice(encoded.as_bytes(), &mut buffer) {
            Ok(length) => length,
            Err(_) => {
                warn!("auth: Basic credential is not decodable");
                return None;
            }
        };
        let decoded = std::str::from_utf8(&buffer[..length]).ok()?;
        let (user, passwd) = decoded.split_once(':')?;
        Some((user.to_string(), passwd.to_string()))
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    fn scheme_name(&self) -> &'static str {
        "Basic"
    }

    fn challenge(&self) -> Challenge {
        let value = match self.realm.as_deref() {
            Some(realm) if !realm.is_empty() => format!("Basic realm=\"{realm}\""),
            _ => "Basic".to_string(),
        };
        Challenge::Unauthorized {
            www_authenticate: vec![value],
        }
    }

    async fn check(&mut self, _method: &str, _uri: &str, credential: &str) -> Option<String> {
        let (user, passwd) = Self::decode(credential)?;
        match self.store.check(&user, &passwd).await {
            Ok(true) => Some(user),
            Ok(false) => None,
            Err(err) => {
                error!("auth: backend failure during Basic check: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn authenticator() -> BasicAuthenticator {
        let store = Arc::new(MemoryStore::new().with_user("alice", "wonderland", "users", ""));
        BasicAuthenticator::new(Some("gate".to_string()), store)
    }

    #[test]
    fn challenge_includes_realm() {
        let challenge = authenticator().challenge();
        assert_eq!(
            challenge,
            Challenge::Unauthorized {
                www_authenticate: vec!["Basic realm=\"gate\"".to_string()]
            }
        );
    }

    #[test]
    fn challenge_omits_unset_realm() {
        let store = Arc::new(MemoryStore::new());
        let authenticator = BasicAuthenticator::new(None, store);
        assert_eq!(
            authenticator.challenge(),
            Challenge::Unauthorized {
                www_authenticate: vec!["Basic".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn accepts_stored_pair() {
        // base64("alice:wonderland")
        let mut authenticator = authenticator();
        let user = authenticator
            .check("GET", "/", "YWxpY2U6d29uZGVybGFuZA==")
            .await;
        assert_eq!(user.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn rejects_wrong_password_and_unknown_user() {
        let mut authenticator = authenticator();
        let wrong = STANDARD.encode("alice:rabbit");
        assert_eq!(authenticator.check("GET", "/", &wrong).await, None);
        let unknown = STANDARD.encode("eve:wonderland");
        assert_eq!(authenticator.check("GET", "/", &unknown).await, None);
    }

    #[tokio::test]
    async fn rejects_undecodable_input() {
        let mut authenticator = authenticator();
        assert_eq!(authenticator.check("GET", "/", "!!!not-base64!!!").await, None);
        // no colon in the decoded pair
        let colonless = STANDARD.encode("alicewonderland");
        assert_eq!(authenticator.check("GET", "/", &colonless).await, None);
    }

    #[tokio::test]
    async fn rejects_oversized_credential() {
        let mut authenticator = authenticator();
        let huge = STANDARD.encode(format!("alice:{}", "x".repeat(MAX_DECODED)));
        assert_eq!(authenticator.check("GET", "/", &huge).await, None);
    }

    #[test]
    fn password_may_contain_colons() {
        let (user, passwd) = BasicAuthenticator::decode(&STANDARD.encode("u:a:b:c")).unwrap();
        assert_eq!(user, "u");
        assert_eq!(passwd, "a:b:c");
    }
}
