//! Configuration management for the voice relay.
//!
//! Layers file config over environment variables over programmatic
//! defaults (`load_settings`), the same layering convention the rest of
//! this codebase's configuration surface uses, adapted to this service's
//! own settings tree.

pub mod server;
pub mod settings;
pub mod vad;

pub use server::{AuthConfig, ServerConfig};
pub use settings::{load_settings, Settings};
pub use vad::{
    CacheConfig, ChunkerConfig, InterimConfig, OrchestratorConfig, TranslationConfig, VadConfig,
    VendorConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match &err {
            config::ConfigError::NotFound(path) => ConfigError::FileNotFound(path.clone()),
            _ => ConfigError::ParseError(err.to_string()),
        }
    }
}
