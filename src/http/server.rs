//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Run the admission gate ahead of the request pipeline
//! - Serve challenge verification and liveness endpoints
//! - Spawn background tasks (health monitor, sweeper, admin listener)
//! - Swap in a fresh runtime when the configuration changes

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::EdgeConfig;
use crate::error::Result;
use crate::health::active::HealthMonitor;
use crate::http::render::{deny_response, ChallengeRenderer, JsonChallengeRenderer};
use crate::http::request::{client_identity, propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::sweeper::Sweeper;
use crate::lifecycle::Shutdown;
use crate::runtime::{self, EdgeRuntime, SharedRuntime};
use crate::shield::Decision;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: SharedRuntime,
    pub renderer: Arc<dyn ChallengeRenderer>,
}

/// HTTP server for the edge node.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Build the server with the bundled JSON challenge renderer.
    pub fn new(config: EdgeConfig) -> Result<Self> {
        Self::with_renderer(config, Arc::new(JsonChallengeRenderer))
    }

    pub fn with_renderer(config: EdgeConfig, renderer: Arc<dyn ChallengeRenderer>) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.timeouts.request_secs);
        let state = AppState {
            runtime: runtime::shared(EdgeRuntime::from_config(config)?),
            renderer,
        };
        let router = Self::build_router(request_timeout, state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(request_timeout: Duration, state: AppState) -> Router {
        let edge = Router::new()
            .route("/", get(edge_handler))
            .route("/{*path}", get(edge_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), shield_middleware));

        Router::new()
            .route("/__edge/verify", post(verify_handler))
            .route("/__edge/health", get(health_handler))
            .merge(edge)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(request_timeout))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Live runtime handle, shared with background tasks.
    pub fn runtime(&self) -> SharedRuntime {
        self.state.runtime.clone()
    }

    /// Run the server until shutdown is triggered.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<EdgeConfig>,
        shutdown: Shutdown,
    ) -> std::result::Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let monitor = HealthMonitor::new(self.runtime());
        tokio::spawn(monitor.run(shutdown.subscribe()));

        let sweeper = Sweeper::new(self.runtime());
        tokio::spawn(sweeper.run(shutdown.subscribe()));

        tokio::spawn(apply_config_updates(self.runtime(), config_updates, shutdown.subscribe()));

        let admin = self.state.runtime.load().config.admin.clone();
        if admin.enabled {
            let admin_router = setup_admin_router(self.state.clone(), admin.api_key.clone());
            let admin_listener = TcpListener::bind(&admin.bind_address).await?;
            tracing::info!(address = %admin.bind_address, "Admin API starting");
            let mut admin_shutdown = shutdown.subscribe();
            tokio::spawn(async move {
                let served = axum::serve(admin_listener, admin_router)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API stopped with error");
                }
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_config_updates(
    runtime: SharedRuntime,
    mut updates: mpsc::UnboundedReceiver<EdgeConfig>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match EdgeRuntime::from_config(config) {
                    Ok(next) => {
                        runtime.store(Arc::new(next));
                        tracing::info!("Configuration reloaded; shield and cache state reset");
                    }
                    Err(e) => tracing::error!(error = %e, "Reloaded configuration rejected"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Runs the admission gate; only allowed requests reach the pipeline.
async fn shield_middleware(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(peer, request.headers());
    let decision = state.runtime.load().gate.decide(&identity, request.headers());

    match decision {
        Decision::Allow => next.run(request).await,
        Decision::Challenge(descriptor) => {
            tracing::info!(
                request_id = %request_id(request.headers()),
                client = %identity,
                kind = descriptor.kind().as_str(),
                "Challenge required"
            );
            state.renderer.render(&descriptor)
        }
        Decision::Deny(reason) => deny_response(reason, identity.address),
    }
}

/// Serves an admitted request through hotlink check, cache, and origin.
async fn edge_handler(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let key = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let runtime = state.runtime.load_full();
    runtime.pipeline.handle(key, &headers).await.into_response()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyRequest {
    pub token: String,
    #[serde(default)]
    pub answer: Option<String>,
}

async fn verify_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<VerifyRequest>,
) -> Response {
    let identity = client_identity(peer, &headers);
    let verified = state
        .runtime
        .load()
        .gate
        .verify(&identity, &body.token, body.answer.as_deref());

    let status = if verified { StatusCode::OK } else { StatusCode::FORBIDDEN };
    (status, Json(serde_json::json!({ "verified": verified }))).into_response()
}

async fn health_handler() -> Json<serde_json::Value> {
    let time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    Json(serde_json::json!({ "status": "ok", "time": time }))
}
