//! Resource snapshot providers
//!
//! A [`SnapshotProvider`] answers the four queries a snapshot is built from.
//! [`collect_snapshot`] runs them under one deadline and applies the
//! fail-open policy: optional fields that cannot be fetched are logged and
//! zero-filled, while missing container limits abort the collection.

mod kubernetes;
pub mod quantity;
mod retry;

pub use kubernetes::{is_in_cluster, KubeProvider, SERVICE_ACCOUNT_TOKEN};
pub use retry::{fetch_limits_with_retry, RetryPolicy};

use crate::error::{CollectError, ProviderError};
use crate::models::{
    ContainerLimits, ContainerUsage, ReplicaCounts, ResourceSnapshot, SnapshotField,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Default per-request collection deadline
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read-only source of snapshot data
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Ready flag of the watched container in its Pod
    async fn container_readiness(&self) -> Result<bool, ProviderError>;

    /// Declared and available replicas of the Deployment
    async fn deployment_replicas(&self) -> Result<ReplicaCounts, ProviderError>;

    /// Static limits, cached since startup
    async fn container_limits(&self) -> Result<ContainerLimits, ProviderError>;

    /// Live CPU and memory usage
    async fn container_usage(&self) -> Result<ContainerUsage, ProviderError>;
}

/// Build a fresh snapshot, waiting at most `timeout` on the provider.
pub async fn collect_snapshot(
    provider: &dyn SnapshotProvider,
    container_name: &str,
    timeout: Duration,
) -> Result<ResourceSnapshot, CollectError> {
    let deadline = Instant::now() + timeout;

    let (replicas, limits, ready, usage) = tokio::join!(
        bounded(deadline, timeout, provider.deployment_replicas()),
        bounded(deadline, timeout, provider.container_limits()),
        bounded(deadline, timeout, provider.container_readiness()),
        bounded(deadline, timeout, provider.container_usage()),
    );

    let limits = limits.map_err(|e| {
        warn!(error = %e, "Container limits unavailable");
        CollectError::LimitsUnavailable(e)
    })?;
    let mut snapshot = ResourceSnapshot::new(container_name, limits);

    match replicas {
        Ok(counts) => snapshot = snapshot.with_replicas(counts),
        Err(e) => fail_open(&mut snapshot, SnapshotField::DeploymentReplicas, &e),
    }
    match ready {
        Ok(ready) => snapshot = snapshot.with_ready(ready),
        Err(e) => fail_open(&mut snapshot, SnapshotField::ContainerReadiness, &e),
    }
    match usage {
        Ok(usage) => snapshot = snapshot.with_usage(usage),
        Err(e) => fail_open(&mut snapshot, SnapshotField::ContainerUsage, &e),
    }

    debug!(
        replicas = snapshot.deployment_replicas,
        available_replicas = snapshot.deployment_available_replicas,
        ready = snapshot.container_ready,
        cpu_usage_millicores = snapshot.container_cpu_usage,
        memory_usage_mb = snapshot.container_mem_usage,
        "Collected resource snapshot"
    );

    Ok(snapshot)
}

/// Fail-open policy for optional fields.
///
/// The field keeps its zero value, which reads as 0% usage, no replicas or
/// not ready. A metrics API hiccup therefore biases towards accepting traffic.
fn fail_open(snapshot: &mut ResourceSnapshot, field: SnapshotField, error: &ProviderError) {
    warn!(field = %field, error = %error, "Snapshot field unavailable, using zero value");
    snapshot.degraded_fields.push(field);
}

async fn bounded<T>(
    deadline: Instant,
    budget: Duration,
    query: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    timeout_at(deadline, query)
        .await
        .unwrap_or(Err(ProviderError::Timeout(budget)))
}
