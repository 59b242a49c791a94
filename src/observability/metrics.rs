//! Metrics collection and exposition.
//!
//! # Metrics
//! - `opcua_iterations_total` (counter): scheduler passes
//! - `opcua_timer_callbacks_total` (counter): timer callbacks run
//! - `opcua_connections_accepted_total` (counter): admitted connections
//! - `opcua_active_connections` (gauge): open connections
//! - `opcua_messages_total{type}` (counter): UA TCP messages received
//! - `opcua_iteration_errors_total` (counter): failed passes
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_iteration() {
    counter!("opcua_iterations_total").increment(1);
}

pub fn record_timers_fired(count: usize) {
    counter!("opcua_timer_callbacks_total").increment(count as u64);
}

pub fn record_connection_accepted() {
    counter!("opcua_connections_accepted_total").increment(1);
}

pub fn set_active_connections(count: usize) {
    gauge!("opcua_active_connections").set(count as f64);
}

pub fn record_message(message_type: &'static str) {
    counter!("opcua_messages_total", "type" => message_type).increment(1);
}

pub fn record_iteration_error() {
    counter!("opcua_iteration_errors_total").increment(1);
}
