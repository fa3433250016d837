//! Stored-password fields: plain values or tagged salted hashes.
//!
//! Tagged fields have the shape `$<tag>$[realm=<realm>$]<payload>` where the
//! tag carries a single algorithm character (`1` MD5, `5` SHA-256, `6`
//! SHA-512) plus optional flags: `a` marks a base64 payload, `d` is a
//! reserved no-op kept for format compatibility. When a realm is present the
//! digest binds `user:realm:password`, otherwise just `password`.

use subtle::ConstantTimeEq;
use tracing::warn;

use crate::hash::HashAlg;

/// Placeholder stored for provisioned-but-passwordless accounts.
///
/// Accounts created through token or management flows carry this value until
/// a password is set explicitly; it never verifies.
pub const UNUSABLE_PASSWORD: &str = "*";

/// A parsed `$<tag>$[realm=<realm>$]<payload>` field, borrowing the input.
#[derive(Debug, PartialEq, Eq)]
pub struct TaggedPassword<'a> {
    pub alg: HashAlg,
    /// Payload is base64 rather than lowercase hex.
    pub base64: bool,
    pub realm: Option<&'a str>,
    pub payload: &'a str,
}

/// Parse a tagged password field. Returns `None` for plain fields, unknown
/// algorithm tags, and malformed input alike; callers fail closed.
pub fn parse_tagged(field: &str) -> Option<TaggedPassword<'_>> {
    let rest = field.strip_prefix('$')?;
    let (tag, rest) = rest.split_once('$')?;

    let mut alg = None;
    let mut base64 = false;
    for c in tag.chars() {
        match c {
            'a' => base64 = true,
            // reserved flag, kept for backward format compatibility
            'd' => {}
            c => match HashAlg::from_algoid(c) {
                Some(found) if alg.is_none() => alg = Some(found),
                _ => return None,
            },
        }
    }
    let alg = alg?;

    let (realm, payload) = match rest.strip_prefix("realm=") {
        Some(after) => {
            let (realm, payload) = after.split_once('$')?;
            (Some(realm), payload)
        }
        None => (None, rest),
    };
    if payload.is_empty() {
        return None;
    }

    Some(TaggedPassword {
        alg,
        base64,
        realm,
        payload,
    })
}

/// Verify `candidate` against a stored field for `user`.
///
/// Plain fields compare directly; tagged fields recompute the digest with
/// the field's own algorithm and realm. Unknown tags are a data problem,
/// not a user error: they are logged and fail closed.
pub fn verify(user: &str, field: &str, candidate: &str) -> bool {
    if field == UNUSABLE_PASSWORD {
        return false;
    }
    if !field.starts_with('$') {
        return constant_time_eq(field.as_bytes(), candidate.as_bytes());
    }

    let Some(tagged) = parse_tagged(field) else {
        warn!("auth: unknown or malformed password tag for user {user}");
        return false;
    };

    let digest = match tagged.realm {
        Some(realm) => tagged.alg.digest_parts(&[
            user.as_bytes(),
            b":",
            realm.as_bytes(),
            b":",
            candidate.as_bytes(),
        ]),
        None => tagged.alg.digest_parts(&[candidate.as_bytes()]),
    };

    // Untagged payloads of digest length are hex; anything else (including
    // every field written by the original tooling) is base64.
    let rendered = if tagged.base64 || tagged.payload.len() != tagged.alg.size() * 2 {
        base64_encode(&digest)
    } else {
        hex::encode(&digest)
    };
    constant_time_eq(rendered.as_bytes(), tagged.payload.as_bytes())
}

/// Extract a pre-computed Digest A1 from a tagged field, as lowercase hex.
///
/// The tag must name the scheme's active algorithm; any other tag means the
/// field cannot serve this challenge and verification fails closed.
pub fn precomputed_a1(field: &str, alg: HashAlg) -> Option<String> {
    let tagged = parse_tagged(field)?;
    if tagged.alg != alg {
        warn!(
            "auth: password tag {} does not match negotiated {}",
            tagged.alg.name(),
            alg.name()
        );
        return None;
    }
    if tagged.base64 {
        let raw = base64_decode(tagged.payload)?;
        Some(hex::encode(raw))
    } else {
        Some(tagged.payload.to_ascii_lowercase())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    // ct_eq is length-sensitive; a length mismatch is an immediate false.
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

fn base64_encode(data: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.encode(data)
}

fn base64_decode(data: &str) -> Option<Vec<u8>> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.decode(data).ok()
}
