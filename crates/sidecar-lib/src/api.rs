//! HTTP API for the readiness probe and snapshot metrics

use crate::admission::AdmissionEngine;
use crate::health::{CollectionFailure, HealthReport};
use crate::models::{ResourceSnapshot, TargetRef};
use crate::observability::{SidecarMetrics, StructuredLogger};
use crate::provider::{collect_snapshot, SnapshotProvider, DEFAULT_COLLECT_TIMEOUT};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

const INDEX: &str = "metrics sidecar is running\n\n\
available endpoints:\n\
- /healthz: admission health check\n\
- /metrics: resource snapshot\n\
- /metrics/prometheus: sidecar metrics\n";

/// Upper bound on a whole request, collection included
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state
pub struct AppState {
    pub provider: Arc<dyn SnapshotProvider>,
    pub engine: Arc<AdmissionEngine>,
    pub target: TargetRef,
    pub collect_timeout: Duration,
    pub request_timeout: Duration,
    pub metrics: SidecarMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        engine: Arc<AdmissionEngine>,
        target: TargetRef,
    ) -> Self {
        let logger = StructuredLogger::new(&target.pod_name);
        Self {
            provider,
            engine,
            target,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            metrics: SidecarMetrics::new(),
            logger,
        }
    }

    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    /// Requests still running after `timeout` are answered with 408
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Collect a snapshot, or the 503 response to send instead
    async fn collect(&self) -> Result<ResourceSnapshot, Response> {
        let started = Instant::now();
        let result = collect_snapshot(
            self.provider.as_ref(),
            &self.target.container_name,
            self.collect_timeout,
        )
        .await;
        self.metrics.observe_collection_latency(started.elapsed());

        match result {
            Ok(snapshot) => {
                if snapshot.is_degraded() {
                    for field in &snapshot.degraded_fields {
                        self.metrics.inc_degraded_field(*field);
                    }
                    self.logger.log_collection_degraded(&snapshot.degraded_fields);
                }
                Ok(snapshot)
            }
            Err(e) => {
                self.metrics.inc_collection_errors();
                self.logger.log_collection_failed(&e);
                let failure = CollectionFailure::new(&e);
                Err((failure.status_code(), Json(failure)).into_response())
            }
        }
    }
}

/// Admission probe - 200 when accepting, 400 when shedding, 503 when blind
async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    let started = Instant::now();

    let snapshot = match state.collect().await {
        Ok(snapshot) => snapshot,
        Err(response) => return response,
    };

    let (verdict, backoff) = state.engine.evaluate_with_state(&snapshot);
    state.metrics.record_verdict(&verdict, backoff);
    state.logger.log_verdict(&verdict, started.elapsed());

    let report = HealthReport::new(&state.target.deployment_name, &snapshot, verdict);
    (report.status_code(), Json(report)).into_response()
}

/// Raw resource snapshot; never evaluates admission
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.collect().await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(response) => response,
    }
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode Prometheus metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn index() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        INDEX,
    )
}

async fn log_requests(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    let response = next.run(req).await;

    state.logger.log_request(
        method.as_str(),
        &path,
        remote_addr.as_deref(),
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .layer(TimeoutLayer::new(state.request_timeout))
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves, then drain in-flight requests
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
