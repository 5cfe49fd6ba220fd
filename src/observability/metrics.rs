//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define edge metrics (requests, admission, cache, origins)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `edge_requests_total` (counter): pipeline responses by status and source
//! - `edge_request_duration_seconds` (histogram): pipeline latency
//! - `edge_admission_decisions_total` (counter): allow / challenge / deny
//! - `edge_admission_fail_open_total` (counter): gate errors admitted anyway
//! - `edge_challenge_verifications_total` (counter): by outcome
//! - `edge_cache_lookups_total` (counter): hit / miss
//! - `edge_cache_entries`, `edge_cache_bytes` (gauge)
//! - `edge_cache_evictions_total` (counter)
//! - `edge_origin_fetches_total` (counter): by origin and outcome
//! - `edge_origin_fetch_duration_seconds` (histogram)
//! - `edge_origin_health` (gauge): 1=healthy, 0=unhealthy
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels stay low-cardinality; paths are never used as labels

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{EdgeError, Result};
use crate::shield::Decision;

/// Install the Prometheus exporter, serving `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EdgeError::Internal(format!("failed to install metrics exporter: {}", e)))?;

    describe_counter!("edge_requests_total", "Responses produced by the request pipeline");
    describe_histogram!("edge_request_duration_seconds", "Pipeline latency in seconds");
    describe_counter!("edge_admission_decisions_total", "Admission gate decisions");
    describe_counter!("edge_admission_fail_open_total", "Gate errors that admitted the request");
    describe_counter!("edge_challenge_verifications_total", "Challenge answers checked");
    describe_counter!("edge_cache_lookups_total", "Response cache lookups");
    describe_gauge!("edge_cache_entries", "Entries in the response cache");
    describe_gauge!("edge_cache_bytes", "Aggregate encoded size of cached responses");
    describe_counter!("edge_cache_evictions_total", "Entries evicted over the size cap");
    describe_counter!("edge_origin_fetches_total", "Fetches against origin servers");
    describe_histogram!("edge_origin_fetch_duration_seconds", "Origin fetch latency in seconds");
    describe_gauge!("edge_origin_health", "Origin health (1=healthy, 0=unhealthy)");

    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

pub fn record_request(status: u16, source: &'static str, duration: Duration) {
    counter!("edge_requests_total", "status" => status.to_string(), "source" => source).increment(1);
    histogram!("edge_request_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_admission(decision: &Decision) {
    counter!("edge_admission_decisions_total", "decision" => decision.label()).increment(1);
}

pub fn record_admission_fail_open() {
    counter!("edge_admission_fail_open_total").increment(1);
}

pub fn record_verification(verified: bool) {
    let outcome = if verified { "verified" } else { "rejected" };
    counter!("edge_challenge_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("edge_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(entries: usize, bytes: u64) {
    gauge!("edge_cache_entries").set(entries as f64);
    gauge!("edge_cache_bytes").set(bytes as f64);
}

pub fn record_cache_evictions(count: usize) {
    counter!("edge_cache_evictions_total").increment(count as u64);
}

pub fn record_origin_fetch(origin: &str, outcome: &'static str, duration: Duration) {
    counter!(
        "edge_origin_fetches_total",
        "origin" => origin.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("edge_origin_fetch_duration_seconds", "origin" => origin.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_origin_health(origin: &str, healthy: bool) {
    gauge!("edge_origin_health", "origin" => origin.to_string()).set(if healthy { 1.0 } else { 0.0 });
}
