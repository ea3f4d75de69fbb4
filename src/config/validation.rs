use std::collections::HashSet;

use http::{HeaderName, HeaderValue};

use super::{Config, ConfigError, UpstreamConfig};

/// Validate the full config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    validate_log_level(config)?;
    validate_upstreams(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_upstreams(config: &Config) -> Result<(), ConfigError> {
    if config.upstreams.is_empty() {
        return Err(validation_err("upstreams cannot be empty"));
    }

    let mut names = HashSet::new();
    for upstream in &config.upstreams {
        if upstream.name.trim().is_empty() {
            return Err(validation_err("upstream name cannot be empty"));
        }
        if !names.insert(upstream.name.as_str()) {
            return Err(validation_err(format!(
                "duplicate upstream name '{}'",
                upstream.name
            )));
        }
        validate_upstream(upstream)?;
    }
    Ok(())
}

fn validate_upstream(upstream: &UpstreamConfig) -> Result<(), ConfigError> {
    let name = &upstream.name;
    validate_http_url(name, "base_url", &upstream.base_url)?;
    if let Some(proxy) = upstream.proxy.as_deref() {
        if proxy.trim().is_empty() {
            return Err(validation_err(format!(
                "Upstream '{name}': proxy cannot be empty when set"
            )));
        }
        validate_http_url(name, "proxy", proxy.trim())?;
    }
    if upstream.timeout_secs == 0 {
        return Err(validation_err(format!(
            "Upstream '{name}': timeout_secs must be greater than 0"
        )));
    }
    if upstream.thinking_budget == Some(0) {
        return Err(validation_err(format!(
            "Upstream '{name}': thinking_budget must be greater than 0 when set"
        )));
    }
    if let Some(key) = upstream.api_key.as_deref() {
        if key.trim().is_empty() {
            return Err(validation_err(format!(
                "Upstream '{name}': api_key cannot be empty when set"
            )));
        }
    }
    if let Some(var) = upstream.api_key_env.as_deref() {
        if var.trim().is_empty() {
            return Err(validation_err(format!(
                "Upstream '{name}': api_key_env cannot be empty when set"
            )));
        }
    }
    for (header, value) in &upstream.extra_headers {
        if HeaderName::from_bytes(header.as_bytes()).is_err() {
            return Err(validation_err(format!(
                "Upstream '{name}': invalid header name '{header}'"
            )));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(validation_err(format!(
                "Upstream '{name}': invalid value for header '{header}'"
            )));
        }
    }
    Ok(())
}

fn validate_http_url(upstream: &str, field_name: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|err| {
        validation_err(format!(
            "Upstream '{upstream}': {field_name} is not a valid URL: {err}"
        ))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "Upstream '{upstream}': {field_name} must use http:// or https://"
        )));
    }
    Ok(())
}

fn validate_log_level(config: &Config) -> Result<(), ConfigError> {
    let valid_levels = ["TRACE", "DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
