//! Health probe response bodies
//!
//! Maps admission verdicts and collection failures to the status codes and
//! JSON bodies served on `/healthz`.

use crate::admission::{AdmissionStatus, AdmissionVerdict};
use crate::error::CollectError;
use crate::models::{ResourceSnapshot, SnapshotField};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Deployment section of the health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentHealth {
    pub name: String,
    pub replicas: i32,
    pub available_replicas: i32,
    pub availability_percent: f64,
}

/// Container section of the health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHealth {
    pub name: String,
    pub ready: bool,
    pub memory_usage_mb: i64,
    pub memory_limit_mb: i64,
    pub memory_percent: f64,
    pub cpu_usage_millicores: i64,
    pub cpu_limit_millicores: i64,
    pub cpu_percent: f64,
}

/// Body of a `/healthz` answer.
///
/// Percentages and replica counts are always present, whatever the verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: AdmissionStatus,
    pub accept: bool,
    pub message: String,
    pub deployment: DeploymentHealth,
    pub container: ContainerHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_draw: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_fields: Vec<SnapshotField>,
    pub last_check_timestamp: i64,
}

impl HealthReport {
    pub fn new(
        deployment_name: impl Into<String>,
        snapshot: &ResourceSnapshot,
        verdict: AdmissionVerdict,
    ) -> Self {
        let ratios = verdict.ratios;
        Self {
            status: verdict.status,
            accept: verdict.accept,
            message: verdict.message,
            deployment: DeploymentHealth {
                name: deployment_name.into(),
                replicas: snapshot.deployment_replicas,
                available_replicas: snapshot.deployment_available_replicas,
                availability_percent: ratios.available_percent,
            },
            container: ContainerHealth {
                name: snapshot.container_name.clone(),
                ready: snapshot.container_ready,
                memory_usage_mb: snapshot.container_mem_usage,
                memory_limit_mb: snapshot.container_mem_limit,
                memory_percent: ratios.memory_percent,
                cpu_usage_millicores: snapshot.container_cpu_usage,
                cpu_limit_millicores: snapshot.container_cpu_limit,
                cpu_percent: ratios.cpu_percent,
            },
            random_draw: verdict.random_draw,
            degraded_fields: snapshot.degraded_fields.clone(),
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// 200 when traffic is accepted, 400 when the sidecar sheds it
    pub fn status_code(&self) -> StatusCode {
        if self.accept {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        }
    }
}

/// Body returned when no snapshot could be collected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionFailure {
    pub error: String,
}

impl CollectionFailure {
    pub fn new(err: &CollectError) -> Self {
        Self {
            error: format!("unable to collect resource metrics: {err}"),
        }
    }

    /// Distinct from the reject code so probes can tell the two apart
    pub fn status_code(&self) -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
