use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use regex::RegexSet;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use super::schema::TaggerConfig;
use crate::error::{ConfigError, Result};

pub const ENV_PREFIX: &str = "CALL_TAGGER_";

pub fn load_from_env_or_file() -> Result<TaggerConfig> {
    let figment = Figment::new()
        .merge(Toml::file("call-tagger.toml"))
        .merge(Json::file("call-tagger.json"))
        .merge(Yaml::file("call-tagger.yaml"))
        .merge(Yaml::file("call-tagger.yml"))
        // Nested keys use a double underscore: CALL_TAGGER_LISTENER__EVENT_LEVEL
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    extract(figment)
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<TaggerConfig> {
    let path = path.as_ref();

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

fn extract(figment: Figment) -> Result<TaggerConfig> {
    let config: TaggerConfig = figment
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&config)?;

    Ok(config)
}

pub fn validate(config: &TaggerConfig) -> Result<()> {
    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::Validation("Logging level must not be empty".into()).into());
    }

    if let Err(e) = EnvFilter::try_new(&config.logging.level) {
        return Err(ConfigError::Validation(format!(
            "Invalid logging level '{}': {}",
            config.logging.level, e
        ))
        .into());
    }

    for kind in &config.listener.tracked_kinds {
        if kind.trim().is_empty() {
            return Err(
                ConfigError::Validation("Tracked kind patterns must not be empty".into()).into(),
            );
        }
    }

    compile_tracked_kinds(&config.listener.tracked_kinds)?;

    Ok(())
}

/// Compiles the tracked-kind patterns; `None` means every record kind is tracked.
pub fn compile_tracked_kinds(patterns: &[String]) -> Result<Option<RegexSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    // Report the first offending pattern rather than the combined set error
    for pattern in patterns {
        if let Err(e) = regex::Regex::new(pattern) {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            }
            .into());
        }
    }

    let set = RegexSet::new(patterns).map_err(|e| ConfigError::InvalidPattern {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })?;

    Ok(Some(set))
}
