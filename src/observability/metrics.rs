//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_route_matched_total` (counter): matched requests by match type
//! - `router_no_route_total` (counter): requests no route accepted
//! - `router_route_build_errors_total` (counter): routes rejected at build
//! - `router_reloads_total` (counter): table reloads by result
//! - `router_table_generation` (gauge): generation of the published table
//!
//! # Design Decisions
//! - Hot-path labels are `&'static str` so recording does not allocate
//! - Recording without an installed exporter is a no-op

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::routing::PathMatchType;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus metrics exporter"),
    }
}

pub fn record_route_matched(match_type: PathMatchType) {
    metrics::counter!("router_route_matched_total", "match_type" => match_type.as_str())
        .increment(1);
}

pub fn record_no_route() {
    metrics::counter!("router_no_route_total").increment(1);
}

pub fn record_build_errors(count: usize) {
    metrics::counter!("router_route_build_errors_total").increment(count as u64);
}

pub fn record_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("router_reloads_total", "result" => result).increment(1);
}

pub fn record_generation(generation: u64) {
    metrics::gauge!("router_table_generation").set(generation as f64);
}
