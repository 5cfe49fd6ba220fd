//! Request pipeline for admitted requests.
//!
//! # Data Flow
//! ```text
//! Admitted request (path + query, headers)
//!     → hotlink.rs check (403 on foreign referer)
//!     → ResponseCache lookup (hit returned verbatim)
//!     → OriginSelector fetch (miss)
//!         → success status: cached under the same key
//!         → failure: 502, nothing cached
//! ```
//!
//! # Design Decisions
//! - Admission runs before this stage, in the HTTP middleware
//! - One origin attempt per request

pub mod hotlink;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, StatusCode};

use crate::cache::ResponseCache;
use crate::config::EdgeConfig;
use crate::error::Result;
use crate::http::response::EdgeResponse;
use crate::observability::metrics;
use crate::origin::OriginSelector;

pub use hotlink::HotlinkGuard;

pub const HOTLINK_DENIED: &str = "Hotlink protection: Access denied";
pub const ORIGIN_ERROR: &str = "Origin server error";

/// Hotlink check, cache, and origin fetch for one edge node.
#[derive(Debug)]
pub struct EdgeRequestPipeline {
    hotlink: Option<HotlinkGuard>,
    cache: Arc<ResponseCache>,
    cache_enabled: bool,
    cache_ttl: Duration,
    origins: Arc<OriginSelector>,
}

impl EdgeRequestPipeline {
    pub fn new(
        hotlink: Option<HotlinkGuard>,
        cache: Arc<ResponseCache>,
        cache_enabled: bool,
        cache_ttl: Duration,
        origins: Arc<OriginSelector>,
    ) -> Self {
        Self {
            hotlink,
            cache,
            cache_enabled,
            cache_ttl,
            origins,
        }
    }

    pub fn from_config(config: &EdgeConfig) -> Result<Self> {
        let hotlink = config
            .hotlink
            .enabled
            .then(|| HotlinkGuard::new(&config.hotlink.allowed_domains));
        let origins = OriginSelector::new(&config.origins, config.limits.max_response_bytes)?;

        Ok(Self::new(
            hotlink,
            Arc::new(ResponseCache::from_config(&config.cache)),
            config.cache.enabled,
            Duration::from_secs(config.cache.ttl_secs),
            Arc::new(origins),
        ))
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn origins(&self) -> &Arc<OriginSelector> {
        &self.origins
    }

    /// Serve `path` (path plus query string) for an admitted request.
    pub async fn handle(&self, path: &str, headers: &HeaderMap) -> EdgeResponse {
        let started = Instant::now();
        let (response, source) = self.serve(path, headers).await;
        metrics::record_request(response.status.as_u16(), source, started.elapsed());
        response
    }

    async fn serve(&self, path: &str, headers: &HeaderMap) -> (EdgeResponse, &'static str) {
        if let Some(guard) = &self.hotlink {
            if !guard.check(headers) {
                tracing::info!(path = %path, "Hotlink protection rejected request");
                return (EdgeResponse::text(StatusCode::FORBIDDEN, HOTLINK_DENIED), "hotlink");
            }
        }

        if let Some(cached) = self.cache.get(path) {
            tracing::debug!(path = %path, "Cache hit");
            return (cached, "cache");
        }

        match self.origins.fetch(path).await {
            Ok(response) => {
                if self.cache_enabled && response.status.is_success() {
                    self.cache.set(path, response.clone(), self.cache_ttl);
                }
                (response, "origin")
            }
            Err(e) if e.is_origin_failure() => {
                tracing::warn!(path = %path, error = %e, "Origin fetch failed, returning 502");
                (EdgeResponse::text(StatusCode::BAD_GATEWAY, ORIGIN_ERROR), "error")
            }
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Unexpected error while fetching, returning 502");
                (EdgeResponse::text(StatusCode::BAD_GATEWAY, ORIGIN_ERROR), "error")
            }
        }
    }
}
