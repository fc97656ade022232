use thiserror::Error;

/// Crate-wide error type. Variants map directly to the error taxonomy in the
/// component design: security/admission errors are recovered locally by the
/// middleware and never reach a caller as this type; this enum covers
/// construction-time and event-model failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("secret key is empty")]
    EmptySecretKey,

    #[error("secret key is too weak: must be at least 32 bytes with nontrivial entropy")]
    WeakSecretKey,

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
