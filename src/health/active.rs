//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe origins
//! - Flip each origin's health flag from the probe result

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request};
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::lifecycle::ticker::retune;
use crate::observability::metrics;
use crate::origin::{OriginEndpoint, OriginSelector, EDGE_USER_AGENT};
use crate::runtime::SharedRuntime;

pub struct HealthMonitor {
    runtime: SharedRuntime,
}

impl HealthMonitor {
    pub fn new(runtime: SharedRuntime) -> Self {
        Self { runtime }
    }

    /// Probe until shutdown. Each tick reads the current runtime, so origins
    /// and a changed `interval_secs` from a reload are picked up.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.runtime.load().config.health_check.clone();
        tracing::info!(
            interval = config.interval_secs,
            path = %config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(config.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let runtime = self.runtime.load_full();
                    probe_origins(runtime.pipeline.origins(), &runtime.config.health_check).await;
                    retune(&mut ticker, Duration::from_secs(runtime.config.health_check.interval_secs), "health monitor");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Probe every origin with health checks enabled, concurrently.
pub async fn probe_origins(selector: &OriginSelector, config: &HealthCheckConfig) {
    let probes = selector
        .endpoints()
        .iter()
        .filter(|endpoint| endpoint.health_check_enabled)
        .map(|endpoint| async move {
            let healthy = probe(selector, endpoint, config).await;
            endpoint.set_healthy(healthy);
            metrics::record_origin_health(endpoint.url.as_str(), healthy);
        });
    join_all(probes).await;
}

async fn probe(selector: &OriginSelector, endpoint: &OriginEndpoint, config: &HealthCheckConfig) -> bool {
    let origin = endpoint.url.as_str();
    let request = match endpoint.resolve(&config.path).and_then(|uri| {
        Request::get(uri)
            .header(header::USER_AGENT, EDGE_USER_AGENT)
            .body(Body::empty())
            .map_err(|e| crate::error::EdgeError::Internal(e.to_string()))
    }) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(origin = %origin, error = %e, "Failed to build health check request");
            return false;
        }
    };

    let timeout = Duration::from_secs(config.timeout_secs);
    match time::timeout(timeout, selector.client().request(request)).await {
        Ok(Ok(response)) => {
            let success = response.status().is_success();
            if !success {
                tracing::warn!(origin = %origin, status = %response.status(), "Health check failed: non-success status");
            }
            success
        }
        Ok(Err(e)) => {
            tracing::warn!(origin = %origin, error = %e, "Health check failed: connection error");
            false
        }
        Err(_) => {
            tracing::warn!(origin = %origin, "Health check failed: timeout");
            false
        }
    }
}
