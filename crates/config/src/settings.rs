//! Layered settings: `config/default.yaml`, optional `config/{env}.yaml`,
//! then environment variables prefixed `VOICE_RELAY__` (double underscore
//! nesting), then programmatic defaults.

use crate::server::ServerConfig;
use crate::vad::{
    CacheConfig, ChunkerConfig, InterimConfig, OrchestratorConfig, TranslationConfig, VadConfig,
    VendorConfig,
};
use crate::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub vad: VadConfig,
    pub chunker: ChunkerConfig,
    pub interim: InterimConfig,
    pub translation: TranslationConfig,
    pub cache: CacheConfig,
    pub vendor: VendorConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Load settings the way the rest of this codebase's config layer does:
/// `config/default.yaml` as the base, an optional `config/{env}.yaml`
/// override selected by `APP_ENV` (defaulting to `development`), then
/// `VOICE_RELAY__*` environment variables on top.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

    let builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name(&format!("config/{env}")).required(false))
        .add_source(
            config::Environment::with_prefix("VOICE_RELAY")
                .separator("__")
                .try_parsing(true),
        );

    let raw = builder.build()?;
    let settings: Settings = raw.try_deserialize()?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.orchestrator.min_participants < 1 {
        return Err(ConfigError::InvalidValue {
            field: "orchestrator.min_participants".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    if settings.orchestrator.max_participants < settings.orchestrator.min_participants {
        return Err(ConfigError::InvalidValue {
            field: "orchestrator.max_participants".to_string(),
            message: "must be >= min_participants".to_string(),
        });
    }
    if settings.server.auth.enabled && settings.server.auth.api_key.as_deref().unwrap_or("").is_empty()
    {
        return Err(ConfigError::MissingField(
            "server.auth.api_key (required when server.auth.enabled = true)".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let settings = Settings::default();
        assert!(validate(&settings).is_ok());
    }

    #[test]
    fn auth_enabled_without_key_is_rejected() {
        let mut settings = Settings::default();
        settings.server.auth.enabled = true;
        settings.server.auth.api_key = None;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn max_below_min_participants_is_rejected() {
        let mut settings = Settings::default();
        settings.orchestrator.min_participants = 3;
        settings.orchestrator.max_participants = 2;
        assert!(validate(&settings).is_err());
    }
}
