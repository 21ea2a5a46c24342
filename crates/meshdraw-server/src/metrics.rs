//! Metrics collection and export for meshdraw.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const PACKETS_TOTAL: &str = "meshdraw_packets_total";
    pub const DECODE_ERRORS_TOTAL: &str = "meshdraw_decode_errors_total";
    pub const REGISTRATIONS_TOTAL: &str = "meshdraw_registrations_total";
    pub const NODE_UPDATES_TOTAL: &str = "meshdraw_node_updates_total";
    pub const DRAWS_TOTAL: &str = "meshdraw_draws_total";
    pub const PARTICIPANTS: &str = "meshdraw_participants";
    pub const LINK_UP: &str = "meshdraw_link_up";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::PACKETS_TOTAL, "Total number of mesh packets received");
    metrics::describe_counter!(
        names::DECODE_ERRORS_TOTAL,
        "Total number of packets dropped as undecodable"
    );
    metrics::describe_counter!(
        names::REGISTRATIONS_TOTAL,
        "Total number of draw registrations"
    );
    metrics::describe_counter!(
        names::NODE_UPDATES_TOTAL,
        "Total number of node display name changes"
    );
    metrics::describe_counter!(names::DRAWS_TOTAL, "Total number of draws by outcome");
    metrics::describe_gauge!(names::PARTICIPANTS, "Current number of registered participants");
    metrics::describe_gauge!(names::LINK_UP, "Whether the radio link is up (1) or down (0)");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a received packet by kind ("text", "nodeinfo", "other").
pub fn record_packet(kind: &'static str) {
    counter!(names::PACKETS_TOTAL, "kind" => kind).increment(1);
}

/// Record a dropped packet.
pub fn record_decode_error() {
    counter!(names::DECODE_ERRORS_TOTAL).increment(1);
}

/// Record a new registration.
pub fn record_registration() {
    counter!(names::REGISTRATIONS_TOTAL).increment(1);
}

/// Record a node name change.
pub fn record_node_update() {
    counter!(names::NODE_UPDATES_TOTAL).increment(1);
}

/// Record a draw outcome ("started", "published", "discarded", "rejected").
pub fn record_draw(outcome: &'static str) {
    counter!(names::DRAWS_TOTAL, "outcome" => outcome).increment(1);
}

/// Update the registered participant count.
pub fn set_participants(count: usize) {
    gauge!(names::PARTICIPANTS).set(count as f64);
}

/// Update the radio link state.
pub fn set_link_up(up: bool) {
    gauge!(names::LINK_UP).set(if up { 1.0 } else { 0.0 });
}
