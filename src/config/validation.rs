//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Endpoint URLs must be `opc.tcp` with host and port
//! - Validate value ranges (buffer sizes, wait bounds, connection limits)
//! - Detect duplicate namespaces
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use crate::config::schema::ServerConfig;
use crate::net::frame::MIN_BUFFER_SIZE;
use crate::net::EndpointUrl;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.endpoints.is_empty() {
        errors.push(ValidationError::new("server.endpoints", "at least one endpoint is required"));
    }
    for (i, endpoint) in config.server.endpoints.iter().enumerate() {
        if let Err(e) = EndpointUrl::parse(endpoint) {
            errors.push(ValidationError::new(format!("server.endpoints[{}]", i), e.to_string()));
        }
    }
    if config.server.application_uri.trim().is_empty() {
        errors.push(ValidationError::new("server.application_uri", "must not be empty"));
    }

    let limits = &config.limits;
    if limits.max_connections == 0 {
        errors.push(ValidationError::new("limits.max_connections", "must be greater than 0"));
    }
    if limits.receive_buffer_size < MIN_BUFFER_SIZE {
        errors.push(ValidationError::new(
            "limits.receive_buffer_size",
            format!("must be at least {}", MIN_BUFFER_SIZE),
        ));
    }
    if limits.send_buffer_size < MIN_BUFFER_SIZE {
        errors.push(ValidationError::new(
            "limits.send_buffer_size",
            format!("must be at least {}", MIN_BUFFER_SIZE),
        ));
    }
    if limits.max_message_size != 0 && limits.max_message_size < limits.receive_buffer_size {
        errors.push(ValidationError::new(
            "limits.max_message_size",
            "must be 0 or at least receive_buffer_size",
        ));
    }

    if config.scheduler.max_wait_ms == 0 {
        errors.push(ValidationError::new("scheduler.max_wait_ms", "must be greater than 0"));
    }
    if config.runner.io_backoff_max_ms < config.runner.io_backoff_base_ms {
        errors.push(ValidationError::new(
            "runner.io_backoff_max_ms",
            "must not be smaller than io_backoff_base_ms",
        ));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    let mut seen = HashSet::new();
    for (i, ns) in config.namespaces.iter().enumerate() {
        if ns.uri.trim().is_empty() {
            errors.push(ValidationError::new(format!("namespaces[{}].uri", i), "must not be empty"));
        } else if !seen.insert(ns.uri.as_str()) || ns.uri == config.server.application_uri {
            errors.push(ValidationError::new(
                format!("namespaces[{}].uri", i),
                format!("duplicate namespace '{}'", ns.uri),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::NamespaceConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ServerConfig::default();
        config.server.endpoints = vec!["http://localhost:80/".into(), "opc.tcp://host/".into()];
        config.limits.max_connections = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "server.endpoints[0]",
                "server.endpoints[1]",
                "limits.max_connections",
                "observability.log_level",
            ]
        );
    }

    #[test]
    fn rejects_small_buffers() {
        let mut config = ServerConfig::default();
        config.limits.receive_buffer_size = 1024;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "limits.receive_buffer_size"));
    }

    #[test]
    fn rejects_duplicate_namespaces() {
        let mut config = ServerConfig::default();
        config.namespaces = vec![
            NamespaceConfig { uri: "http://mynodes.local".into() },
            NamespaceConfig { uri: "http://mynodes.local".into() },
        ];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "namespaces[1].uri");
    }
}
