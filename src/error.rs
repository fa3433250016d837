use thiserror::Error;

/// Credential-store failures.
///
/// Both variants surface to the end user as "authentication denied";
/// `Backend` additionally indicates an operational problem and is logged
/// distinctly from ordinary auth failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user or token not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Module-creation failures. Creation fails closed: a module that cannot
/// satisfy its scheme's requirements never starts.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("scheme {scheme} requires a credential store with {capability}")]
    IncompatibleBackend {
        scheme: &'static str,
        capability: &'static str,
    },
    #[error("scheme none requires a configured username")]
    MissingUser,
    #[error("credential store unavailable: {0}")]
    Store(#[from] StoreError),
}
