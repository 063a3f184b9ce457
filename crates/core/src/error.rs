//! Domain error types shared across the relay.

use thiserror::Error;

/// Errors raised by the speech vendor facade.
#[derive(Error, Debug, Clone)]
pub enum VendorError {
    #[error("vendor call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("vendor transport error: {0}")]
    Transport(String),

    #[error("vendor credentials missing or invalid: {0}")]
    Credentials(String),
}

/// Core-level error type. Individual crates define their own scoped error
/// enums (`PipelineError`, `TransportError`, `ServerError`, `ConfigError`)
/// and convert into this one only at crate boundaries that need it.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("vendor error: {0}")]
    Vendor(#[from] VendorError),

    #[error("unknown language tag: {0}")]
    UnknownLanguage(String),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
