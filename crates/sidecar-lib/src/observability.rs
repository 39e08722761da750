//! Observability infrastructure for the metrics sidecar
//!
//! Provides:
//! - Prometheus metrics (collection latency, verdicts, degraded fields, backoff)
//! - Structured JSON logging with tracing

use crate::admission::{AdmissionStatus, AdmissionVerdict, BackoffState};
use crate::models::{SnapshotField, TargetRef};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for snapshot collection latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SidecarMetricsInner> = OnceLock::new();

struct SidecarMetricsInner {
    collection_latency_seconds: Histogram,
    verdicts: IntCounterVec,
    collection_errors: IntCounter,
    degraded_fields: IntCounterVec,
    backoff_draws: IntCounter,
    backoff_locked: IntGauge,
}

impl SidecarMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "metrics_sidecar_collection_latency_seconds",
                "Time spent collecting a resource snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            verdicts: register_int_counter_vec!(
                "metrics_sidecar_verdicts_total",
                "Admission verdicts by status",
                &["status"]
            )
            .expect("Failed to register verdicts_total"),

            collection_errors: register_int_counter!(
                "metrics_sidecar_collection_errors_total",
                "Snapshot collections that failed for lack of container limits"
            )
            .expect("Failed to register collection_errors_total"),

            degraded_fields: register_int_counter_vec!(
                "metrics_sidecar_degraded_fields_total",
                "Optional snapshot fields zero-filled after a provider failure",
                &["field"]
            )
            .expect("Failed to register degraded_fields_total"),

            backoff_draws: register_int_counter!(
                "metrics_sidecar_backoff_draws_total",
                "Random backoff draws made during overload"
            )
            .expect("Failed to register backoff_draws_total"),

            backoff_locked: register_int_gauge!(
                "metrics_sidecar_backoff_locked",
                "1 while the sidecar rejects for the current overload episode"
            )
            .expect("Failed to register backoff_locked"),
        }
    }
}

/// Sidecar metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct SidecarMetrics {
    _private: (),
}

impl Default for SidecarMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SidecarMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SidecarMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SidecarMetricsInner {
        GLOBAL_METRICS.get_or_init(SidecarMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, elapsed: Duration) {
        self.inner()
            .collection_latency_seconds
            .observe(elapsed.as_secs_f64());
    }

    pub fn inc_collection_errors(&self) {
        self.inner().collection_errors.inc();
    }

    pub fn inc_degraded_field(&self, field: SnapshotField) {
        self.inner()
            .degraded_fields
            .with_label_values(&[field.as_str()])
            .inc();
    }

    /// Record a verdict and the backoff state it left behind
    pub fn record_verdict(&self, verdict: &AdmissionVerdict, backoff: BackoffState) {
        let inner = self.inner();
        inner
            .verdicts
            .with_label_values(&[verdict.status.as_str()])
            .inc();
        if verdict.random_draw.is_some() {
            inner.backoff_draws.inc();
        }
        inner
            .backoff_locked
            .set(i64::from(backoff == BackoffState::LockedReject));
    }
}

/// Structured logger for sidecar events
///
/// Provides consistent JSON-formatted logging for verdicts, degraded
/// collections and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    pod_name: String,
}

impl StructuredLogger {
    pub fn new(pod_name: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
        }
    }

    /// Log an admission verdict
    pub fn log_verdict(&self, verdict: &AdmissionVerdict, elapsed: Duration) {
        let r = &verdict.ratios;
        match verdict.status {
            AdmissionStatus::ResourceExhausted => {
                warn!(
                    event = "admission_verdict",
                    pod = %self.pod_name,
                    status = %verdict.status,
                    accept = verdict.accept,
                    cpu_percent = r.cpu_percent,
                    memory_percent = r.memory_percent,
                    available_percent = r.available_percent,
                    random_draw = ?verdict.random_draw,
                    elapsed_ms = elapsed.as_millis() as u64,
                    message = %verdict.message,
                    "Rejecting traffic"
                );
            }
            _ => {
                info!(
                    event = "admission_verdict",
                    pod = %self.pod_name,
                    status = %verdict.status,
                    accept = verdict.accept,
                    cpu_percent = r.cpu_percent,
                    memory_percent = r.memory_percent,
                    available_percent = r.available_percent,
                    random_draw = ?verdict.random_draw,
                    elapsed_ms = elapsed.as_millis() as u64,
                    message = %verdict.message,
                    "Health check evaluated"
                );
            }
        }
    }

    /// Log a snapshot that was served with zero-filled fields
    pub fn log_collection_degraded(&self, fields: &[SnapshotField]) {
        let fields: Vec<&str> = fields.iter().map(SnapshotField::as_str).collect();
        warn!(
            event = "collection_degraded",
            pod = %self.pod_name,
            fields = ?fields,
            "Snapshot served with zero-filled fields"
        );
    }

    /// Log a collection that could not produce a snapshot
    pub fn log_collection_failed(&self, error: &dyn std::error::Error) {
        warn!(
            event = "collection_failed",
            pod = %self.pod_name,
            error = %error,
            "Unable to collect resource snapshot"
        );
    }

    /// Log a completed HTTP request
    pub fn log_request(
        &self,
        method: &str,
        path: &str,
        remote_addr: Option<&str>,
        status: u16,
        elapsed: Duration,
    ) {
        info!(
            event = "http_request",
            method = %method,
            path = %path,
            remote_addr = remote_addr.unwrap_or("-"),
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "HTTP request completed"
        );
    }

    /// Log sidecar startup
    pub fn log_startup(&self, version: &str, target: &TargetRef) {
        info!(
            event = "sidecar_started",
            pod = %self.pod_name,
            sidecar_version = %version,
            namespace = %target.namespace,
            deployment = %target.deployment_name,
            container = %target.container_name,
            "Metrics sidecar started"
        );
    }

    /// Log sidecar shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sidecar_shutdown",
            pod = %self.pod_name,
            reason = %reason,
            "Metrics sidecar shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::Ratios;

    #[test]
    fn test_sidecar_metrics_recording() {
        let metrics = SidecarMetrics::new();

        metrics.observe_collection_latency(Duration::from_millis(12));
        metrics.inc_collection_errors();
        metrics.inc_degraded_field(SnapshotField::ContainerUsage);

        let verdict = AdmissionVerdict::new(
            AdmissionStatus::ResourceExhausted,
            "hot",
            Ratios::default(),
        )
        .with_draw(80.0);
        metrics.record_verdict(&verdict, BackoffState::LockedReject);

        assert_eq!(metrics.inner().backoff_locked.get(), 1);
        assert!(metrics.inner().backoff_draws.get() >= 1);
        assert!(
            metrics
                .inner()
                .verdicts
                .with_label_values(&["RESOURCE_EXHAUSTED"])
                .get()
                >= 1
        );
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("web-7d9f-abcde");
        assert_eq!(logger.pod_name, "web-7d9f-abcde");
    }
}
