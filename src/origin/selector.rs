//! Origin selection and fetching.
//!
//! # Responsibilities
//! - Pick a healthy origin uniformly at random
//! - Fetch a resource with the origin's timeout enforced
//! - Map upstream failures onto the edge error taxonomy

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

use crate::config::OriginConfig;
use crate::error::{EdgeError, Result};
use crate::http::response::EdgeResponse;
use crate::observability::metrics;
use crate::origin::endpoint::OriginEndpoint;

/// User-Agent sent on origin fetches and health probes.
pub const EDGE_USER_AGENT: &str = concat!("edge-shield/", env!("CARGO_PKG_VERSION"));

/// The configured origins plus the client used to reach them.
#[derive(Debug)]
pub struct OriginSelector {
    endpoints: Vec<Arc<OriginEndpoint>>,
    client: Client<HttpConnector, Body>,
    max_response_bytes: usize,
}

impl OriginSelector {
    pub fn new(configs: &[OriginConfig], max_response_bytes: usize) -> Result<Self> {
        if configs.is_empty() {
            return Err(EdgeError::Config("at least one origin is required".to_string()));
        }
        let endpoints = configs
            .iter()
            .map(|config| OriginEndpoint::from_config(config).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            endpoints,
            client,
            max_response_bytes,
        })
    }

    pub fn endpoints(&self) -> &[Arc<OriginEndpoint>] {
        &self.endpoints
    }

    pub fn client(&self) -> &Client<HttpConnector, Body> {
        &self.client
    }

    pub fn healthy_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_healthy()).count()
    }

    /// Uniform choice among healthy origins. Weights are not consulted.
    pub fn select(&self) -> Result<Arc<OriginEndpoint>> {
        let healthy: Vec<&Arc<OriginEndpoint>> = self.endpoints.iter().filter(|e| e.is_healthy()).collect();
        if healthy.is_empty() {
            return Err(EdgeError::NoHealthyOrigin);
        }
        Ok(healthy[fastrand::usize(..healthy.len())].clone())
    }

    /// Fetch `path_and_query` from one selected origin. No retry on failure.
    pub async fn fetch(&self, path_and_query: &str) -> Result<EdgeResponse> {
        let endpoint = self.select()?;
        let origin = endpoint.url.to_string();
        let started = Instant::now();

        let result = match time::timeout(endpoint.timeout, self.fetch_from(&endpoint, path_and_query)).await {
            Ok(result) => result,
            Err(_) => Err(EdgeError::OriginTimeout {
                origin: origin.clone(),
                timeout: endpoint.timeout,
            }),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(EdgeError::OriginTimeout { .. }) => "timeout",
            Err(_) => "error",
        };
        metrics::record_origin_fetch(&origin, outcome, started.elapsed());

        if let Err(e) = &result {
            tracing::warn!(origin = %origin, path = %path_and_query, error = %e, "Origin fetch failed");
        }
        result
    }

    async fn fetch_from(&self, endpoint: &OriginEndpoint, path_and_query: &str) -> Result<EdgeResponse> {
        let fetch_error = |message: String| EdgeError::OriginFetchError {
            origin: endpoint.url.to_string(),
            message,
        };

        let uri = endpoint.resolve(path_and_query)?;
        let request = Request::get(uri)
            .header(header::USER_AGENT, HeaderValue::from_static(EDGE_USER_AGENT))
            .body(Body::empty())
            .map_err(|e| fetch_error(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_response_bytes)
            .await
            .map_err(|e| fetch_error(format!("failed to read body: {}", e)))?;

        tracing::debug!(origin = %endpoint.url, path = %path_and_query, status = %parts.status, "Origin responded");
        Ok(EdgeResponse::from_upstream(parts.status, parts.headers, body))
    }
}
