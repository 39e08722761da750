//! Kubernetes-backed snapshot provider
//!
//! Readiness and replica counts come from the core and apps APIs, usage from
//! `metrics.k8s.io/v1beta1`. Limits are read from the Deployment's pod
//! template once at startup and served from memory afterwards.

use super::quantity;
use super::retry::{fetch_limits_with_retry, RetryPolicy};
use super::{async_trait, SnapshotProvider};
use crate::error::{ProviderError, StartupError};
use crate::models::{ContainerLimits, ContainerUsage, ReplicaCounts, TargetRef};
use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

/// Service account token mounted into every in-cluster Pod
pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

const METRICS_GROUP: &str = "metrics.k8s.io";
const METRICS_VERSION: &str = "v1beta1";

/// Check if running in a Kubernetes cluster
pub fn is_in_cluster() -> bool {
    has_service_account_token(Path::new(SERVICE_ACCOUNT_TOKEN))
}

fn has_service_account_token(token: &Path) -> bool {
    token.is_file()
}

/// `PodMetrics` body below the object metadata
#[derive(Debug, Deserialize)]
struct PodMetricsData {
    #[serde(default)]
    containers: Vec<ContainerMetricsData>,
}

#[derive(Debug, Deserialize)]
struct ContainerMetricsData {
    name: String,
    #[serde(default)]
    usage: BTreeMap<String, String>,
}

fn metrics_resource(kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(METRICS_GROUP, METRICS_VERSION, kind),
        plural,
    )
}

/// Snapshot provider backed by the Kubernetes API server
pub struct KubeProvider {
    client: Client,
    target: TargetRef,
    limits: OnceLock<ContainerLimits>,
}

impl KubeProvider {
    pub fn new(client: Client, target: TargetRef) -> Self {
        Self {
            client,
            target,
            limits: OnceLock::new(),
        }
    }

    /// Build a client: in-cluster when the service account token exists,
    /// else from `kubeconfig`, else by the default inference rules.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
        let config = if is_in_cluster() {
            info!("Using in-cluster Kubernetes configuration");
            Config::incluster().context("Failed to load in-cluster configuration")?
        } else if let Some(path) = kubeconfig {
            info!(kubeconfig = %path.display(), "Using kubeconfig file");
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Failed to build configuration from kubeconfig")?
        } else {
            info!("Inferring Kubernetes configuration");
            Config::infer()
                .await
                .context("Failed to infer Kubernetes configuration")?
        };

        Client::try_from(config).context("Failed to create Kubernetes client")
    }

    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    /// Fetch and cache the container limits, retrying per `policy`
    pub async fn init_limits(&self, policy: &RetryPolicy) -> Result<ContainerLimits, StartupError> {
        info!(
            container = %self.target.container_name,
            deployment = %self.target.deployment_name,
            "Fetching container resource limits"
        );
        let limits = fetch_limits_with_retry(policy, || self.fetch_limits()).await?;
        Ok(*self.limits.get_or_init(|| limits))
    }

    /// Verify that metrics-server answers by listing a single `NodeMetrics`
    pub async fn check_metrics_api(&self, timeout: Duration) -> Result<(), StartupError> {
        info!("Checking metrics.k8s.io API availability");
        let api: Api<DynamicObject> =
            Api::all_with(self.client.clone(), &metrics_resource("NodeMetrics", "nodes"));

        match tokio::time::timeout(timeout, api.list(&ListParams::default().limit(1))).await {
            Ok(Ok(_)) => {
                info!("metrics.k8s.io API is available");
                Ok(())
            }
            Ok(Err(e)) => Err(StartupError::MetricsApiUnavailable(e.into())),
            Err(_) => Err(StartupError::MetricsApiUnavailable(ProviderError::Timeout(
                timeout,
            ))),
        }
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.target.namespace)
    }

    async fn fetch_limits(&self) -> Result<ContainerLimits, ProviderError> {
        let deployment = self.deployments().get(&self.target.deployment_name).await?;

        let container = deployment
            .spec
            .and_then(|spec| spec.template.spec)
            .and_then(|pod| {
                pod.containers
                    .into_iter()
                    .find(|c| c.name == self.target.container_name)
            })
            .ok_or_else(|| ProviderError::ContainerNotFound {
                container: self.target.container_name.clone(),
                scope: format!("deployment {}", self.target.deployment_name),
            })?;

        let limits = container
            .resources
            .and_then(|r| r.limits)
            .unwrap_or_default();
        let cpu_millicores = limits
            .get("cpu")
            .map(|q| quantity::cpu_millicores(&q.0))
            .transpose()?
            .unwrap_or(0);
        let memory_mb = limits
            .get("memory")
            .map(|q| quantity::memory_mb(&q.0))
            .transpose()?
            .unwrap_or(0);

        Ok(ContainerLimits {
            cpu_millicores,
            memory_mb,
        })
    }
}

#[async_trait]
impl SnapshotProvider for KubeProvider {
    async fn container_readiness(&self) -> Result<bool, ProviderError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.target.namespace);
        let pod = pods.get(&self.target.pod_name).await?;

        let ready = pod
            .status
            .and_then(|s| s.container_statuses)
            .unwrap_or_default()
            .into_iter()
            .find(|cs| cs.name == self.target.container_name)
            .map(|cs| cs.ready);

        if ready.is_none() {
            debug!(
                container = %self.target.container_name,
                pod = %self.target.pod_name,
                "No container status reported, treating as not ready"
            );
        }
        Ok(ready.unwrap_or(false))
    }

    async fn deployment_replicas(&self) -> Result<ReplicaCounts, ProviderError> {
        let deployment = self.deployments().get(&self.target.deployment_name).await?;

        Ok(deployment
            .status
            .map(|s| ReplicaCounts {
                replicas: s.replicas.unwrap_or(0),
                available_replicas: s.available_replicas.unwrap_or(0),
            })
            .unwrap_or_default())
    }

    async fn container_limits(&self) -> Result<ContainerLimits, ProviderError> {
        self.limits
            .get()
            .copied()
            .ok_or(ProviderError::LimitsNotInitialized)
    }

    async fn container_usage(&self) -> Result<ContainerUsage, ProviderError> {
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &self.target.namespace,
            &metrics_resource("PodMetrics", "pods"),
        );
        let object = api.get(&self.target.pod_name).await?;
        let data: PodMetricsData = serde_json::from_value(object.data)?;

        let container = data
            .containers
            .into_iter()
            .find(|c| c.name == self.target.container_name)
            .ok_or_else(|| ProviderError::ContainerNotFound {
                container: self.target.container_name.clone(),
                scope: format!("pod metrics {}", self.target.pod_name),
            })?;

        Ok(ContainerUsage {
            cpu_millicores: usage_of(&container.usage, "cpu", quantity::cpu_millicores)?,
            memory_mb: usage_of(&container.usage, "memory", quantity::memory_mb)?,
        })
    }
}

fn usage_of(
    usage: &BTreeMap<String, String>,
    resource: &str,
    convert: fn(&str) -> Result<i64, ProviderError>,
) -> Result<i64, ProviderError> {
    usage.get(resource).map_or(Ok(0), |q| convert(q))
}
