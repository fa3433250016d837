//! Pluggable HTTP authentication: Basic, Digest, and Bearer schemes over
//! interchangeable credential stores.

pub mod config;
pub mod error;
pub mod hash;
pub mod nonce;
pub mod password;
pub mod scheme;
pub mod store;

pub use config::{AuthConfig, SchemeKind};
pub use error::{CreateError, StoreError};
pub use hash::HashAlg;
pub use scheme::{AuthInfo, AuthModule, Authenticator, Challenge};
pub use store::{CredentialStore, FileStore, MemoryStore, SqliteStore, UserRecord};
