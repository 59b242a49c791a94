//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::address_space::NodeDefinition;

/// Root configuration for the OPC UA server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server identity and endpoints.
    pub server: IdentityConfig,

    /// Transport limits negotiated with clients.
    pub limits: LimitsConfig,

    /// Iteration scheduler tuning.
    pub scheduler: SchedulerConfig,

    /// Run loop error policy.
    pub runner: RunnerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Additional namespaces registered at startup.
    pub namespaces: Vec<NamespaceConfig>,

    /// Inline node definitions.
    pub nodes: Vec<NodeDefinition>,

    /// JSON files holding further node definitions.
    pub node_files: Vec<PathBuf>,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Human-readable server name.
    pub name: String,

    /// Application URI, also registered as namespace 1.
    pub application_uri: String,

    /// Endpoint URLs (e.g., "opc.tcp://0.0.0.0:4840/").
    pub endpoints: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "OPC-UA-Server".to_string(),
            application_uri: format!("urn:opcua-lite:{}", uuid::Uuid::new_v4()),
            endpoints: vec!["opc.tcp://0.0.0.0:4840/freeopcua/server/".to_string()],
        }
    }
}

/// Transport limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Largest chunk the server accepts, in bytes.
    pub receive_buffer_size: u32,

    /// Largest chunk the server sends, in bytes.
    pub send_buffer_size: u32,

    /// Largest message the server accepts, in bytes.
    pub max_message_size: u32,

    /// Maximum chunks per message (0 = no limit).
    pub max_chunk_count: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            receive_buffer_size: 65_535,
            send_buffer_size: 65_535,
            max_message_size: 2 * 1024 * 1024,
            max_chunk_count: 0,
        }
    }
}

/// Iteration scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on a single blocking iteration, in milliseconds.
    pub max_wait_ms: u64,

    /// Period of the server clock timer in milliseconds (0 = disabled).
    pub clock_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 50,
            clock_interval_ms: 1000,
        }
    }
}

/// Run loop error policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Consecutive failed iterations tolerated before the loop aborts.
    pub max_consecutive_io_errors: u32,

    /// Base delay for backoff after a failed iteration.
    pub io_backoff_base_ms: u64,

    /// Maximum delay for backoff after a failed iteration.
    pub io_backoff_max_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_io_errors: 5,
            io_backoff_base_ms: 10,
            io_backoff_max_ms: 1000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A namespace registered on startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NamespaceConfig {
    /// Namespace URI (e.g., "http://mynodes.local").
    pub uri: String,
}
