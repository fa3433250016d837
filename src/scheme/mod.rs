//! Authentication schemes and the module registry binding a scheme to a
//! credential store.
//!
//! The host HTTP server drives each connection through the same contract:
//! create the module once, derive a per-connection authenticator (`setup`
//! rolls nonce state), emit `challenge` on 401 paths, and hand incoming
//! credential headers to `check`.

use async_trait::async_trait;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderMap, HeaderValue, StatusCode};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{error, warn};

use crate::config::{AuthConfig, SchemeKind};
use crate::error::CreateError;
use crate::hash::HashAlg;
use crate::store::CredentialStore;

pub mod basic;
pub mod bearer;
pub mod digest;
pub mod none;

pub use basic::BasicAuthenticator;
pub use bearer::BearerAuthenticator;
pub use digest::DigestAuthenticator;
pub use none::NoneAuthenticator;

/// What the HTTP layer should do after an unauthenticated request.
#[derive(Debug, PartialEq, Eq)]
pub enum Challenge {
    /// Send 401 with the given `WWW-Authenticate` value(s); more than one
    /// value means more than one header line, in order.
    Unauthorized { www_authenticate: Vec<String> },
    /// The scheme needs no challenge round; keep processing the request.
    Continue,
}

impl Challenge {
    /// Apply the challenge to a response: append header values and return
    /// the status to send, or `None` to continue.
    pub fn apply(&self, headers: &mut HeaderMap) -> Option<StatusCode> {
        match self {
            Self::Unauthorized { www_authenticate } => {
                for value in www_authenticate {
                    match HeaderValue::from_str(value) {
                        Ok(value) => {
                            headers.append(WWW_AUTHENTICATE, value);
                        }
                        Err(_) => {
                            warn!("auth: challenge value is not a valid header, dropped");
                        }
                    }
                }
                Some(StatusCode::UNAUTHORIZED)
            }
            Self::Continue => None,
        }
    }
}

/// Per-connection authentication engine.
///
/// `check` never errors toward the caller: malformed input, unknown users,
/// and backend failures all collapse into `None` so a client cannot probe
/// why it was rejected. Backend failures are logged before collapsing.
#[async_trait]
pub trait Authenticator: Send {
    fn scheme_name(&self) -> &'static str;

    /// Roll per-connection state (nonce, stale counter). Called once per
    /// accepted connection, before the first challenge.
    fn setup(&mut self) {}

    fn challenge(&self) -> Challenge;

    /// Verify a credential header value against the bound store, returning
    /// the authenticated username.
    async fn check(&mut self, method: &str, uri: &str, credential: &str) -> Option<String>;
}

/// Post-authentication identity exposed to downstream filters (method lock,
/// CGI environment, user filter).
#[derive(Clone, Debug)]
pub struct AuthInfo {
    pub user: String,
    pub group: Option<String>,
    pub home: Option<String>,
    pub authtype: &'static str,
}

/// A configured scheme bound to a credential store, shared by a listener.
pub struct AuthModule {
    config: Arc<AuthConfig>,
    store: Arc<dyn CredentialStore>,
    hash: HashAlg,
}

impl AuthModule {
    /// Bind `config` to `store`, validating that the store can actually
    /// serve the scheme. Misconfiguration is fatal here, never at request
    /// time: a module that cannot verify credentials must not start.
    pub fn create(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, CreateError> {
        let hash = HashAlg::from_name(&config.algorithm)
            .ok_or_else(|| CreateError::UnknownAlgorithm(config.algorithm.clone()))?;

        match config.scheme {
            SchemeKind::Basic | SchemeKind::Digest => {
                if !store.supports_passwords() {
                    error!(
                        "auth: {} is not compatible with backend {}",
                        config.scheme.name(),
                        store.backend_name()
                    );
                    return Err(CreateError::IncompatibleBackend {
                        scheme: config.scheme.name(),
                        capability: "password lookup",
                    });
                }
            }
            SchemeKind::Bearer => {
                if !store.supports_tokens() {
                    error!(
                        "auth: Bearer is not compatible with backend {}",
                        store.backend_name()
                    );
                    return Err(CreateError::IncompatibleBackend {
                        scheme: "Bearer",
                        capability: "session tokens",
                    });
                }
            }
            SchemeKind::None => {
                if config.user.as_deref().unwrap_or_default().is_empty() {
                    return Err(CreateError::MissingUser);
                }
            }
        }

        Ok(Self {
            config: Arc::new(config),
            store,
            hash,
        })
    }

    pub fn scheme(&self) -> SchemeKind {
        self.config.scheme
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Build a per-connection authenticator with freshly rolled state.
    pub fn authenticator(&self) -> Box<dyn Authenticator> {
        let mut authenticator: Box<dyn Authenticator> = match self.config.scheme {
            SchemeKind::None => Box::new(NoneAuthenticator::new(
                self.config.user.clone().unwrap_or_default(),
            )),
            SchemeKind::Basic => Box::new(BasicAuthenticator::new(
                self.config.realm.clone(),
                Arc::clone(&self.store),
            )),
            SchemeKind::Digest => Box::new(DigestAuthenticator::new(
                self.config.realm.clone(),
                self.config.opaque.clone(),
                self.config
                    .secret
                    .as_ref()
                    .map(|secret| secret.expose_secret().to_string()),
                self.hash,
                Arc::clone(&self.store),
            )),
            SchemeKind::Bearer => Box::new(BearerAuthenticator::new(
                self.config.realm.clone(),
                self.config.allow_expired_token,
                Arc::clone(&self.store),
            )),
        };
        authenticator.setup();
        authenticator
    }

    /// Issue a session token for `user` with the configured lifetime.
    pub async fn issue_token(&self, user: &str, token: &str) -> Result<(), crate::error::StoreError> {
        self.store.issue_token(user, token, self.config.token_ttl).await
    }

    /// Resolve the identity attributes downstream filters ask for once a
    /// request has authenticated.
    pub async fn auth_info(&self, user: &str) -> AuthInfo {
        let group = self.store.lookup_group(user).await.unwrap_or_else(|err| {
            error!("auth: group lookup failed for {user}: {err}");
            None
        });
        let home = self.store.lookup_home(user).await.unwrap_or_else(|err| {
            error!("auth: home lookup failed for {user}: {err}");
            None
        });
        AuthInfo {
            user: user.to_string(),
            group,
            home,
            authtype: self.config.scheme.name(),
        }
    }
}
