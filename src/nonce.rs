//! Server nonce and opaque generation for Digest challenges.
//!
//! Two strategies, selected by configuration: with a server secret the nonce
//! is an HMAC-SHA256 over the current 30-minute time bucket, so a restarted
//! server still recognizes nonces it issued before going down. Without a
//! secret the nonce is pure CSPRNG output and only the issuing instance can
//! verify it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::hash::mac_sha256;

/// Raw nonce material length before base64 encoding.
pub const NONCE_RAW_LEN: usize = 24;

/// Nonce validity window for the MAC'd strategy, in seconds.
const WINDOW_SECONDS: u64 = 30 * 60;

/// Default opaque value, RFC 7616 §3.9.1 example material.
pub const DEFAULT_OPAQUE: &str = "FQhe/qaU925kfnzjCev0ciny7QMkPqMAFRtzCUYo5tdS";

/// Produce a fresh base64 nonce for a challenge cycle.
pub fn generate(secret: Option<&str>) -> String {
    let raw = match secret {
        Some(secret) => windowed(secret, now_epoch()),
        None => random(),
    };
    STANDARD.encode(raw)
}

fn random() -> [u8; NONCE_RAW_LEN] {
    let mut raw = [0u8; NONCE_RAW_LEN];
    OsRng.fill_bytes(&mut raw);
    raw
}

fn windowed(secret: &str, epoch_seconds: u64) -> [u8; NONCE_RAW_LEN] {
    let bucket = epoch_seconds / WINDOW_SECONDS;
    let mac = mac_sha256(secret.as_bytes(), &bucket.to_be_bytes());
    let mut raw = [0u8; NONCE_RAW_LEN];
    raw.copy_from_slice(&mac[..NONCE_RAW_LEN]);
    raw
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
