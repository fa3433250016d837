//! Per-module authentication configuration.
//!
//! Owned by the host server's configuration for the module's lifetime and
//! immutable after creation; the host's loader (TOML, libconfig, whatever)
//! deserializes into these structs.

use secrecy::SecretString;
use serde::Deserialize;

/// Authentication scheme bound to a protected listener or path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    /// No credential exchange; every request maps to the configured user.
    None,
    #[default]
    Basic,
    Digest,
    Bearer,
}

impl SchemeKind {
    /// Scheme label as reported by `AuthInfo::authtype`.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic => "Basic",
            Self::Digest => "Digest",
            Self::Bearer => "Bearer",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub scheme: SchemeKind,
    /// Protection realm announced in challenges. Omitted from the challenge
    /// when unset.
    #[serde(default)]
    pub realm: Option<String>,
    /// Opaque value echoed by Digest clients; a fixed default is used when
    /// unset.
    #[serde(default)]
    pub opaque: Option<String>,
    /// Server secret keying time-windowed Digest nonces. Without it nonces
    /// are random and die with the issuing instance.
    #[serde(default)]
    pub secret: Option<SecretString>,
    /// Digest hash algorithm by protocol name ("MD5", "SHA-256", "SHA-512").
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Account reported by the None scheme.
    #[serde(default)]
    pub user: Option<String>,
    /// Token lifetime in seconds for issuance; zero or negative means the
    /// token never expires.
    #[serde(default)]
    pub token_ttl: i64,
    /// Let Bearer fall back to matching expired tokens. Off by default; the
    /// fallback exists in legacy deployments and is a known design smell.
    #[serde(default)]
    pub allow_expired_token: bool,
}

fn default_algorithm() -> String {
    "MD5".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scheme: SchemeKind::default(),
            realm: None,
            opaque: None,
            secret: None,
            algorithm: default_algorithm(),
            user: None,
            token_ttl: 0,
            allow_expired_token: false,
        }
    }
}
