//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatcher.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::message::Method;
use crate::routing::RouteSpec;

/// Root configuration for the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Log level and output format.
    pub logging: LoggingConfig,

    /// Observe relation settings.
    pub observe: ObserveConfig,

    /// Error response settings.
    pub errors: ErrorConfig,

    /// Route records supplied by handler discovery.
    pub routes: Vec<RouteConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info", "coap_dispatch=debug").
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observe relation configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObserveConfig {
    /// When false, observe requests are served as one-shot requests.
    pub enabled: bool,

    /// Upper bound on live relations; further subscriptions are served one-shot.
    pub max_relations: usize,
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_relations: 1024,
        }
    }
}

/// Error response configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ErrorConfig {
    /// Include a short diagnostic text in error payloads.
    pub expose_messages: bool,
}

/// One route record.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RouteConfig {
    /// Handler name (e.g., "led#set").
    pub handler: String,

    /// Path patterns; empty matches any path.
    pub paths: Vec<String>,

    /// Method names; empty matches any method.
    pub methods: Vec<String>,

    /// Header expressions (`name`, `!name`, `name=value`, `name!=value`).
    pub headers: Vec<String>,

    /// Accepted content-formats, media types or numeric codes.
    pub consumes: Vec<String>,

    /// Produced content-formats, media types or numeric codes.
    pub produces: Vec<String>,
}

impl RouteConfig {
    pub fn to_spec(&self) -> Result<RouteSpec, MappingError> {
        let methods = self
            .methods
            .iter()
            .map(|m| m.parse::<Method>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RouteSpec {
            paths: self.paths.clone(),
            methods,
            headers: self.headers.clone(),
            consumes: self.consumes.clone(),
            produces: self.produces.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: DispatcherConfig = toml::from_str("").unwrap();
        assert_eq!(config, DispatcherConfig::default());
        assert!(config.observe.enabled);
        assert_eq!(config.observe.max_relations, 1024);
        assert!(!config.errors.expose_messages);
    }

    #[test]
    fn parses_routes() {
        let config: DispatcherConfig = toml::from_str(
            r#"
            [logging]
            format = "json"

            [[routes]]
            handler = "led#set"
            paths = ["/led/{id}"]
            methods = ["put"]
            consumes = ["text/plain"]
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        let spec = config.routes[0].to_spec().unwrap();
        assert_eq!(spec.methods, vec![Method::Put]);
        assert!(spec.build().is_ok());
    }
}
