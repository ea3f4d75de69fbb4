pub mod validation;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;
use crate::protocol::canonical::ProviderKind;
use crate::protocol::request::{AuthScheme, UpstreamEndpoint};

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// One upstream the transcoder can talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    pub provider: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the key; read once by [`load_config`].
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub auth_scheme: AuthScheme,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub thinking_budget: Option<u64>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub env_api_key: Option<String>,
}

fn default_timeout_secs() -> u64 {
    180
}

impl UpstreamConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, provider: ProviderKind, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider,
            base_url: base_url.into(),
            api_key: None,
            api_key_env: None,
            api_version: None,
            auth_scheme: AuthScheme::default(),
            project: None,
            thinking_budget: None,
            reasoning_effort: None,
            timeout_secs: default_timeout_secs(),
            proxy: None,
            extra_headers: BTreeMap::new(),
            env_api_key: None,
        }
    }

    /// The request-transcoder view of this upstream.
    #[must_use]
    pub fn endpoint(&self) -> UpstreamEndpoint {
        UpstreamEndpoint {
            kind: self.provider,
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            env_api_key: self.env_api_key.clone(),
            api_version: self.api_version.clone(),
            auth_scheme: self.auth_scheme,
            project: self.project.clone(),
            thinking_budget: self.thinking_budget,
            reasoning_effort: self.reasoning_effort.clone(),
            extra_headers: self
                .extra_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Read `api_key_env` from the process environment.
    pub fn resolve_env_key(&mut self) {
        self.env_api_key = self
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        if self.api_key_env.is_some() && self.env_api_key.is_none() {
            tracing::debug!(upstream = %self.name, "api_key_env is set but the variable is empty");
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub upstreams: Vec<UpstreamConfig>,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Config {
    #[must_use]
    pub fn upstream(&self, name: &str) -> Option<&UpstreamConfig> {
        self.upstreams.iter().find(|u| u.name == name)
    }
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or [`ConfigError::Validation`]
/// when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let mut config: Config = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    for upstream in &mut config.upstreams {
        upstream.resolve_env_key();
    }
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.log_level, "INFO");
        assert_eq!(config.upstreams.len(), 3);
        let claude = config.upstream("claude").unwrap();
        assert_eq!(claude.provider, ProviderKind::Anthropic);
        assert_eq!(claude.timeout_secs, 180);
        let codex = config.upstream("codex").unwrap();
        assert_eq!(codex.provider, ProviderKind::Responses);
    }

    #[test]
    fn test_endpoint_carries_settings() {
        let yaml = r#"
upstreams:
  - name: gemini
    provider: gemini-cli
    base_url: https://cloudcode-pa.googleapis.com
    api_key: tok
    project: my-proj
    thinking_budget: 2048
    extra_headers:
      x-goog-user-project: my-proj
"#;
        let config = parse_config(yaml).unwrap();
        let endpoint = config.upstreams[0].endpoint();
        assert_eq!(endpoint.kind, ProviderKind::CloudCode);
        assert_eq!(endpoint.project.as_deref(), Some("my-proj"));
        assert_eq!(endpoint.thinking_budget, Some(2048));
        assert_eq!(
            endpoint.extra_headers,
            vec![("x-goog-user-project".to_string(), "my-proj".to_string())]
        );
    }

    #[test]
    fn test_env_key_resolved_once() {
        std::env::set_var("RELAY_TRANSCODE_TEST_KEY", "from-env");
        let yaml = r#"
upstreams:
  - name: claude
    provider: anthropic
    base_url: https://api.anthropic.com
    api_key_env: RELAY_TRANSCODE_TEST_KEY
"#;
        let config = parse_config(yaml).unwrap();
        std::env::remove_var("RELAY_TRANSCODE_TEST_KEY");
        assert_eq!(
            config.upstreams[0].endpoint().env_api_key.as_deref(),
            Some("from-env")
        );
    }

    #[test]
    fn test_unknown_provider_is_yaml_error() {
        let yaml = "upstreams:\n  - name: x\n    provider: openai\n    base_url: https://x.test\n";
        assert!(matches!(parse_config(yaml), Err(ConfigError::Yaml(_))));
    }
}
