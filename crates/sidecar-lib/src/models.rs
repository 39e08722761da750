//! Core data models for the metrics sidecar

use serde::{Deserialize, Serialize};

/// Identifies the workload this sidecar watches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub namespace: String,
    pub deployment_name: String,
    pub container_name: String,
    pub pod_name: String,
}

/// Static resource limits of the watched container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLimits {
    pub cpu_millicores: i64,
    pub memory_mb: i64,
}

impl ContainerLimits {
    /// Limits are only usable when both are strictly positive
    pub fn is_valid(&self) -> bool {
        self.cpu_millicores > 0 && self.memory_mb > 0
    }
}

/// Current resource usage of the watched container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub cpu_millicores: i64,
    pub memory_mb: i64,
}

/// Declared and available replica counts of the Deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaCounts {
    pub replicas: i32,
    pub available_replicas: i32,
}

/// Point-in-time view of the container and its Deployment.
///
/// Built fresh for every probe. The serialized form is what `/metrics`
/// returns, so the field names are part of the wire contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub deployment_replicas: i32,
    pub deployment_available_replicas: i32,
    pub container_name: String,
    /// Millicores
    pub container_cpu_limit: i64,
    /// MiB
    pub container_mem_limit: i64,
    pub container_ready: bool,
    /// Millicores
    pub container_cpu_usage: i64,
    /// MiB
    pub container_mem_usage: i64,
    /// Optional fields that could not be collected and were zero-filled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_fields: Vec<SnapshotField>,
}

impl ResourceSnapshot {
    pub fn new(container_name: impl Into<String>, limits: ContainerLimits) -> Self {
        Self {
            container_name: container_name.into(),
            container_cpu_limit: limits.cpu_millicores,
            container_mem_limit: limits.memory_mb,
            ..Default::default()
        }
    }

    pub fn with_replicas(mut self, counts: ReplicaCounts) -> Self {
        self.deployment_replicas = counts.replicas;
        self.deployment_available_replicas = counts.available_replicas;
        self
    }

    pub fn with_usage(mut self, usage: ContainerUsage) -> Self {
        self.container_cpu_usage = usage.cpu_millicores;
        self.container_mem_usage = usage.memory_mb;
        self
    }

    pub fn with_ready(mut self, ready: bool) -> Self {
        self.container_ready = ready;
        self
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_fields.is_empty()
    }
}

/// Snapshot fields that may be zero-filled when their source is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotField {
    DeploymentReplicas,
    ContainerReadiness,
    ContainerUsage,
}

impl SnapshotField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotField::DeploymentReplicas => "deployment_replicas",
            SnapshotField::ContainerReadiness => "container_readiness",
            SnapshotField::ContainerUsage => "container_usage",
        }
    }
}

impl std::fmt::Display for SnapshotField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
