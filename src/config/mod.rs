pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG";
/// Environment variable overriding `server.port`.
pub const PORT_ENV: &str = "PORT";

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

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Seconds allowed for connecting upstream and receiving response headers.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    3000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    120
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_max_request_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            max_request_body_bytes: default_max_request_body_bytes(),
            runtime_worker_threads: None,
        }
    }
}

/// The single upstream provider the relay forwards to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Model value sent upstream, regardless of what the client asked for.
    #[serde(default = "default_routing_model")]
    pub routing_model: String,
    /// Model label reported to clients.
    #[serde(default = "default_public_model")]
    pub public_model: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

fn default_upstream_url() -> String {
    "https://xiamenlabs.com/api/chat/".to_string()
}
fn default_routing_model() -> String {
    "x".to_string()
}
fn default_public_model() -> String {
    "unity".to_string()
}
fn default_referer() -> String {
    "https://xiamenlabs.com/".to_string()
}
fn default_accept_language() -> String {
    "zh-CN,zh;q=0.9,en;q=0.8,zh-TW;q=0.7".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            routing_model: default_routing_model(),
            public_model: default_public_model(),
            referer: default_referer(),
            accept_language: default_accept_language(),
            proxy: None,
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from an optional YAML file, apply environment
/// overrides, and validate it.
///
/// Without a path the compiled-in defaults are used.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation
/// fails or `PORT` is not a valid port number.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&std::fs::read_to_string(path)?)?,
        None => AppConfig::default(),
    };
    apply_port_override(&mut config, std::env::var(PORT_ENV).ok().as_deref())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse YAML config text. An empty document yields the defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when the text is not valid config YAML.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

fn apply_port_override(config: &mut AppConfig, port: Option<&str>) -> Result<(), ConfigError> {
    let Some(port) = port.map(str::trim).filter(|port| !port.is_empty()) else {
        return Ok(());
    };
    config.server.port = port
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{PORT_ENV} must be a port number, got '{port}'")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_relay_contract() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.timeout, 120);
        assert_eq!(config.server.max_request_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.upstream.url, "https://xiamenlabs.com/api/chat/");
        assert_eq!(config.upstream.routing_model, "x");
        assert_eq!(config.upstream.public_model, "unity");
        assert!(config.upstream.proxy.is_none());
        assert_eq!(config.features.log_level, "INFO");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_parse_partial_yaml_keeps_defaults() {
        let config = parse_config(
            "server:\n  port: 8080\n  timeout: 30\nupstream:\n  url: http://127.0.0.1:9000/chat\n",
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.timeout, 30);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.upstream.url, "http://127.0.0.1:9000/chat");
        assert_eq!(config.upstream.public_model, "unity");
    }

    #[test]
    fn test_parse_empty_document() {
        let config = parse_config("  \n").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = parse_config("server: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_port_override() {
        let mut config = AppConfig::default();
        apply_port_override(&mut config, Some("8081")).unwrap();
        assert_eq!(config.server.port, 8081);

        apply_port_override(&mut config, Some("  ")).unwrap();
        assert_eq!(config.server.port, 8081);

        let err = apply_port_override(&mut config, Some("http")).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Some("/nonexistent/relay.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
