use std::collections::HashSet;

use super::{AppConfig, ConfigError};

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_models(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.port == 0 {
        return Err(validation_err("server.port must be greater than 0"));
    }
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    let url = url::Url::parse(&upstream.chat_url)
        .map_err(|e| validation_err(format!("upstream.chat_url is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(validation_err(
            "upstream.chat_url must start with http:// or https://",
        ));
    }
    if let Some(proxy) = upstream.proxy.as_deref() {
        let proxy = proxy.trim();
        if proxy.is_empty() {
            return Err(validation_err("upstream.proxy cannot be empty when set"));
        }
        url::Url::parse(proxy)
            .map_err(|e| validation_err(format!("upstream.proxy is not a valid URL: {e}")))?;
    }
    for name in upstream.headers.keys() {
        if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(validation_err(format!(
                "upstream.headers contains an invalid header name '{name}'"
            )));
        }
    }
    Ok(())
}

fn validate_models(config: &AppConfig) -> Result<(), ConfigError> {
    if config.models.is_empty() {
        return Err(validation_err("models cannot be empty"));
    }
    let mut seen = HashSet::with_capacity(config.models.len());
    for model in &config.models {
        if model.id.trim().is_empty() {
            return Err(validation_err("models contains an empty id"));
        }
        if model.chat_model_id.trim().is_empty() {
            return Err(validation_err(format!(
                "Model '{}': chat_model_id cannot be empty",
                model.id
            )));
        }
        if !seen.insert(model.id.as_str()) {
            return Err(validation_err(format!(
                "Duplicate model id '{}'",
                model.id
            )));
        }
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
