use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::http::server::AppState;
use crate::shield::GateStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub shield: GateStats,
    pub origins_total: usize,
    pub origins_healthy: usize,
}

#[derive(Serialize)]
pub struct OriginStatus {
    pub url: String,
    pub weight: u32,
    pub timeout_secs: u64,
    pub health_check_enabled: bool,
    pub healthy: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PurgeRequest {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Serialize)]
pub struct PurgeResult {
    pub removed: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let runtime = state.runtime.load();
    let origins = runtime.pipeline.origins();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        shield: runtime.gate.stats(),
        origins_total: origins.endpoints().len(),
        origins_healthy: origins.healthy_count(),
    })
}

pub async fn get_origins(State(state): State<AppState>) -> Json<Vec<OriginStatus>> {
    let runtime = state.runtime.load();
    let statuses = runtime
        .pipeline
        .origins()
        .endpoints()
        .iter()
        .map(|origin| OriginStatus {
            url: origin.url.to_string(),
            weight: origin.weight,
            timeout_secs: origin.timeout.as_secs(),
            health_check_enabled: origin.health_check_enabled,
            healthy: origin.is_healthy(),
        })
        .collect();
    Json(statuses)
}

pub async fn get_cache(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.runtime.load().pipeline.cache().stats())
}

/// Purge one path, or the whole cache when the body is empty or names no path.
pub async fn purge_cache(State(state): State<AppState>, body: Bytes) -> Result<Json<PurgeResult>, StatusCode> {
    let request: PurgeRequest = if body.is_empty() {
        PurgeRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?
    };

    let removed = state.runtime.load().pipeline.cache().purge(request.path.as_deref());
    tracing::info!(path = ?request.path, removed, "Cache purged via admin API");
    Ok(Json(PurgeResult { removed }))
}
