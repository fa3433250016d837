//! Digest authentication (RFC 7616/2617) with `qop="auth"`.
//!
//! The engine walks a small state machine per connection: `setup` issues a
//! fresh nonce, `challenge` emits it, `check` verifies the client response
//! against it. A nonce mismatch marks the exchange stale and the next
//! challenge tells the client to retry without re-prompting.

use async_trait::async_trait;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, error, warn};

use super::{Authenticator, Challenge};
use crate::hash::HashAlg;
use crate::nonce;
use crate::password;
use crate::store::CredentialStore;

/// Hard cap on any single parsed attribute value. Longer fields are treated
/// as absent, bounding what a hostile header can make us keep.
const MAX_FIELD: usize = 256;

/// Attribute values parsed out of an `Authorization: Digest` header.
///
/// All slices borrow the input header; nothing is copied or mutated while
/// scanning. Keys are case-sensitive, values quoted or bare (bare values
/// end at a space or comma).
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct DigestParams<'a> {
    username: Option<&'a str>,
    realm: Option<&'a str>,
    nonce: Option<&'a str>,
    uri: Option<&'a str>,
    response: Option<&'a str>,
    cnonce: Option<&'a str>,
    opaque: Option<&'a str>,
    qop: Option<&'a str>,
    nc: Option<&'a str>,
    algorithm: Option<&'a str>,
}

pub(crate) fn parse_params(header: &str) -> DigestParams<'_> {
    let mut params = DigestParams::default();
    let mut rest = header.strip_prefix("Digest ").unwrap_or(header);

    loop {
        rest = rest.trim_start_matches([' ', ',', '\t']);
        if rest.is_empty() {
            break;
        }
        let Some(equals) = rest.find('=') else {
            break;
        };
        let key = &rest[..equals];
        let after = &rest[equals + 1..];

        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                // unterminated quote: take the tail, nothing follows
                None => (quoted, ""),
            }
        } else {
            let end = after.find([' ', ',']).unwrap_or(after.len());
            (&after[..end], &after[end..])
        };
        rest = remainder;

        if value.len() > MAX_FIELD {
            warn!("auth: Digest field {key} exceeds length cap, ignored");
            continue;
        }

        // first occurrence wins
        let slot = match key {
            "username" => &mut params.username,
            "realm" => &mut params.realm,
            "nonce" => &mut params.nonce,
            "uri" => &mut params.uri,
            "response" => &mut params.response,
            "cnonce" => &mut params.cnonce,
            "opaque" => &mut params.opaque,
            "qop" => &mut params.qop,
            "nc" => &mut params.nc,
            "algorithm" => &mut params.algorithm,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
    params
}

/// `A1 = H(username:realm:passwd)`, or the pre-hashed value when the stored
/// field carries a matching `$tag$` prefix. Lowercase hex either way.
fn compute_a1(hash: HashAlg, username: &str, realm: &str, passwd: &str) -> Option<String> {
    if passwd.starts_with('$') {
        password::precomputed_a1(passwd, hash)
    } else {
        Some(hash.hex_digest_parts(&[
            username.as_bytes(),
            b":",
            realm.as_bytes(),
            b":",
            passwd.as_bytes(),
        ]))
    }
}

/// `A2 = H(method:digest-uri)`.
fn compute_a2(hash: HashAlg, method: &str, uri: &str) -> String {
    hash.hex_digest_parts(&[method.as_bytes(), b":", uri.as_bytes()])
}

/// `response = H(A1:nonce[:nc][:cnonce]:qop:A2)` under `qop="auth"`, or the
/// RFC 2069 form `H(A1:nonce:A2)` without qop.
fn compute_response(
    hash: HashAlg,
    a1: &str,
    nonce: &str,
    nc: Option<&str>,
    cnonce: Option<&str>,
    qop: Option<&str>,
    a2: &str,
) -> String {
    let mut parts: Vec<&[u8]> = vec![a1.as_bytes(), b":", nonce.as_bytes()];
    if qop == Some("auth") {
        if let Some(nc) = nc {
            parts.push(b":");
            parts.push(nc.as_bytes());
        }
        if let Some(cnonce) = cnonce {
            parts.push(b":");
            parts.push(cnonce.as_bytes());
        }
        parts.push(b":");
        parts.push(b"auth");
    }
    parts.push(b":");
    parts.push(a2.as_bytes());
    hash.hex_digest_parts(&parts)
}

pub struct DigestAuthenticator {
    realm: Option<String>,
    opaque: String,
    secret: Option<String>,
    hash: HashAlg,
    store: Arc<dyn CredentialStore>,
    nonce: String,
    stale: u8,
}

impl DigestAuthenticator {
    pub fn new(
        realm: Option<String>,
        opaque: Option<String>,
        secret: Option<String>,
        hash: HashAlg,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            realm,
            opaque: opaque.unwrap_or_else(|| nonce::DEFAULT_OPAQUE.to_string()),
            secret,
            hash,
            store,
            nonce: String::new(),
            stale: 0,
        }
    }

    fn www_authenticate(&self) -> String {
        let mut value = String::from("Digest ");
        if let Some(realm) = self.realm.as_deref().filter(|realm| !realm.is_empty()) {
            value.push_str(&format!("realm=\"{realm}\","));
        }
        value.push_str(&format!(
            "qop=\"auth\",nonce=\"{}\",opaque=\"{}\",stale={}",
            self.nonce,
            self.opaque,
            if self.stale != 0 { "true" } else { "false" }
        ));
        value
    }

    #[cfg(test)]
    pub(crate) fn force_nonce(&mut self, nonce: &str) {
        self.nonce = nonce.to_string();
    }

    #[cfg(test)]
    pub(crate) fn stale_counter(&self) -> u8 {
        self.stale
    }
}

#[async_trait]
impl Authenticator for DigestAuthenticator {
    fn scheme_name(&self) -> &'static str {
        "Digest"
    }

    fn setup(&mut self) {
        self.stale = 0;
        self.nonce = nonce::generate(self.secret.as_deref());
    }

    fn challenge(&self) -> Challenge {
        let base = self.www_authenticate();
        let mut www_authenticate = vec![base.clone()];
        // Mainstream browsers ignore any algorithm other than MD5, so the
        // algorithm-free header always comes first and a second header names
        // the real algorithm for clients that can use it.
        if self.hash != HashAlg::Md5 {
            www_authenticate.push(format!("{base},algorithm={}", self.hash.name()));
        }
        Challenge::Unauthorized { www_authenticate }
    }

    async fn check(&mut self, method: &str, uri: &str, credential: &str) -> Option<String> {
        let params = parse_params(credential);

        let Some(client_nonce) = params.nonce else {
            warn!("auth: nonce is unset");
            return None;
        };
        if client_nonce != self.nonce {
            self.stale = (self.stale + 1) % 5;
            warn!("auth: nonce mismatch, marking stale");
            return None;
        }
        match params.algorithm {
            Some(algorithm) if algorithm == self.hash.name() => {}
            other => {
                // Interop workaround, not a failure: clients that cannot do
                // better fall back to MD5 and so do we.
                warn!(
                    "auth: algorithm {:?} does not match negotiated {}, downgrading to MD5",
                    other,
                    self.hash.name()
                );
                self.hash = HashAlg::Md5;
            }
        }
        let realm = self.realm.as_deref().unwrap_or_default();
        if params.opaque.unwrap_or_default() != self.opaque
            || params.realm.unwrap_or_default() != realm
        {
            warn!("auth: opaque or realm mismatch");
            return None;
        }
        let Some(client_uri) = params.uri else {
            warn!("auth: uri is unset");
            return None;
        };
        if client_uri != uri {
            warn!("auth: credential bound to {client_uri} replayed against {uri}");
            return None;
        }

        let username = params.username.unwrap_or_default();
        let passwd = match self.store.lookup_password(username).await {
            Ok(passwd) => passwd,
            Err(err) => {
                error!("auth: backend failure during Digest check: {err}");
                None
            }
        };

        if let (Some(response), Some(passwd)) = (params.response, passwd.as_deref()) {
            let a1 = compute_a1(self.hash, username, realm, passwd)?;
            let a2 = compute_a2(self.hash, method, client_uri);
            let expected = compute_response(
                self.hash,
                &a1,
                client_nonce,
                params.nc,
                params.cnonce,
                params.qop,
                &a2,
            );
            debug!("auth: computed digest for {username}");
            let matches = expected.len() == response.len()
                && bool::from(expected.as_bytes().ct_eq(response.as_bytes()));
            matches.then(|| username.to_string())
        } else if self.store.supports_tokens() {
            // No computable digest: hand the raw credential to the token
            // path, covering bearer-style backends behind Digest config.
            match self.store.check_token(credential, true).await {
                Ok(user) => user,
                Err(err) => {
                    error!("auth: backend failure during token fallback: {err}");
                    None
                }
            }
        } else {
            None
        }
    }
}
