//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (`max_relations` > 0, known log format directives)
//! - Check every route record parses into a route
//! - Detect duplicate route definitions
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatcherConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::config::schema::DispatcherConfig;
use crate::routing::Route;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `routes[2].paths`).
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &DispatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if EnvFilter::try_new(&config.logging.level).is_err() {
        errors.push(ValidationError::new(
            "logging.level",
            format!("invalid filter directive `{}`", config.logging.level),
        ));
    }

    if config.observe.max_relations == 0 {
        errors.push(ValidationError::new(
            "observe.max_relations",
            "must be greater than zero",
        ));
    }

    let mut seen: Vec<(Route, &str)> = Vec::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{i}]");
        if route.handler.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.handler"), "must not be empty"));
        }

        let built = route.to_spec().and_then(|spec| spec.build());
        match built {
            Ok(built) => {
                if let Some((_, existing)) = seen.iter().find(|(r, _)| *r == built) {
                    errors.push(ValidationError::new(
                        field,
                        format!("duplicates the route of `{existing}`"),
                    ));
                } else {
                    seen.push((built, &route.handler));
                }
            }
            Err(e) => errors.push(ValidationError::new(field, e.to_string())),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
