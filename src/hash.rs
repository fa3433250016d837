//! Digest primitives shared by the schemes and the stored-password format.

use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;

/// Hash algorithm negotiated for Digest authentication and referenced by
/// the single-character tag in stored-password fields.
///
/// MD5 is cryptographically broken and is kept only because RFC 2617/7616
/// clients (and every mainstream browser) still require it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlg {
    Md5,
    Sha256,
    Sha512,
}

impl HashAlg {
    /// Protocol name as it appears in `algorithm=` challenge parameters.
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Digest length in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// Single-character tag used in `$<algoid>$...` password fields.
    pub fn algoid(self) -> char {
        match self {
            Self::Md5 => '1',
            Self::Sha256 => '5',
            Self::Sha512 => '6',
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "MD5" => Some(Self::Md5),
            "SHA-256" => Some(Self::Sha256),
            "SHA-512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn from_algoid(id: char) -> Option<Self> {
        match id {
            '1' => Some(Self::Md5),
            '5' => Some(Self::Sha256),
            '6' => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Hash the concatenation of `parts` in order.
    ///
    /// Callers supply separators (`b":"`) explicitly, mirroring the
    /// canonical A1/A2 constructions.
    pub fn digest_parts(self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            Self::Md5 => {
                let mut hasher = Md5::new();
                for part in parts {
                    hasher.update(part);
                }
                hasher.finalize().to_vec()
            }
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                hasher.finalize().to_vec()
            }
            Self::Sha512 => {
                let mut hasher = Sha512::new();
                for part in parts {
                    hasher.update(part);
                }
                hasher.finalize().to_vec()
            }
        }
    }

    /// Lowercase-hex digest of the concatenation of `parts`.
    pub fn hex_digest_parts(self, parts: &[&[u8]]) -> String {
        hex::encode(self.digest_parts(parts))
    }
}

/// HMAC-SHA256, used to derive time-windowed nonces from a server secret.
pub fn mac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
