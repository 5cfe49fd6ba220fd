//! Origin endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream origin
//! - Resolve request paths against the origin's base URL
//! - Track health state written by the probe cycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::http::Uri;
use url::Url;

use crate::config::OriginConfig;
use crate::error::{EdgeError, Result};

/// A single upstream origin.
#[derive(Debug)]
pub struct OriginEndpoint {
    /// Base URL; request paths are appended to it.
    pub url: Url,
    /// Bound on one fetch against this origin.
    pub timeout: Duration,
    /// Configured weight (reported, not used for selection).
    pub weight: u32,
    /// Whether the probe cycle checks this origin.
    pub health_check_enabled: bool,
    healthy: AtomicBool,
}

impl OriginEndpoint {
    /// Origins start healthy until a probe says otherwise.
    pub fn from_config(config: &OriginConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| EdgeError::Config(format!("invalid origin url {:?}: {}", config.url, e)))?;
        if url.scheme() != "http" {
            return Err(EdgeError::Config(format!(
                "origin {:?}: only http origins are supported",
                config.url
            )));
        }
        Ok(Self {
            url,
            timeout: Duration::from_secs(config.timeout_secs),
            weight: config.weight,
            health_check_enabled: config.health_check_enabled,
            healthy: AtomicBool::new(true),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Record a probe result. Returns true if the state changed.
    pub fn set_healthy(&self, healthy: bool) -> bool {
        let previous = self.healthy.swap(healthy, Ordering::Relaxed);
        if previous != healthy {
            tracing::info!(origin = %self.url, healthy, "Origin health changed");
        }
        previous != healthy
    }

    /// Absolute URI for `path_and_query` on this origin.
    pub fn resolve(&self, path_and_query: &str) -> Result<Uri> {
        let base = self.url.as_str().trim_end_matches('/');
        let separator = if path_and_query.starts_with('/') { "" } else { "/" };
        format!("{}{}{}", base, separator, path_and_query)
            .parse::<Uri>()
            .map_err(|e| EdgeError::OriginFetchError {
                origin: self.url.to_string(),
                message: format!("invalid request path {:?}: {}", path_and_query, e),
            })
    }
}
