//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::config::validation::{validate_config, warn_suspicious, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Source format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from the file extension; anything but `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Load and validate configuration from a TOML or JSON file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, ConfigFormat::from_path(path))
}

/// Parse and validate an in-memory configuration document.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = match format {
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };

    validate_config(&config).map_err(ConfigError::Validation)?;
    warn_suspicious(&config);

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Protocol;

    #[test]
    fn test_parse_toml() {
        let config = parse_config(
            r#"
            downstream_protocol = "http2"

            [[virtual_hosts]]
            name = "default"
            domains = ["*"]

            [[virtual_hosts.routes]]
            match = { prefix = "/" }
            route = { cluster_name = "web" }
            "#,
            ConfigFormat::Toml,
        )
        .unwrap();

        assert_eq!(config.downstream_protocol, Protocol::Http2);
        assert_eq!(config.upstream_protocol, Protocol::Http1);
        let route = &config.virtual_hosts[0].routes[0];
        assert_eq!(route.route_match.prefix.as_deref(), Some("/"));
        assert!(route.route_match.case_sensitive);
        let action = route.route.as_ref().unwrap();
        assert_eq!(action.cluster_name.as_deref(), Some("web"));
        assert_eq!(action.cluster_not_found_response_code, 503);
    }

    #[test]
    fn test_parse_json() {
        let config = parse_config(
            r#"{
                "upstream_protocol": "rpc",
                "virtual_hosts": [{
                    "name": "rpc",
                    "domains": ["*"],
                    "routes": [{
                        "match": { "service": "order-service" },
                        "route": { "cluster_name": "orders" }
                    }]
                }]
            }"#,
            ConfigFormat::Json,
        )
        .unwrap();

        assert_eq!(config.upstream_protocol, Protocol::Rpc);
        assert_eq!(
            config.virtual_hosts[0].routes[0].route_match.service.as_deref(),
            Some("order-service")
        );
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let result = parse_config(r#"downstream_protocol = "smtp""#, ConfigFormat::Toml);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_validation_errors_surface() {
        let result = parse_config(
            r#"
            [[virtual_hosts]]
            name = "a"
            domains = []
            "#,
            ConfigFormat::Toml,
        );
        match result {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors, vec![ValidationError::NoDomains("a".into())]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("routes.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("routes.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("routes")), ConfigFormat::Toml);
    }
}
