//! Sidecar configuration

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use sidecar_lib::{ConfigError, TargetRef, Thresholds};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Kubeconfig picked up from the working directory when nothing else is given
const LOCAL_KUBECONFIG: &str = "./kube-config.yaml";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "metrics-sidecar", version, about = "Load-shedding readiness sidecar")]
pub struct Cli {
    /// Kubeconfig used when not running in a cluster
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,
}

impl Cli {
    /// Explicit kubeconfig, else the local one if present
    pub fn kubeconfig_path(&self) -> Option<PathBuf> {
        self.kubeconfig.clone().or_else(|| {
            let local = Path::new(LOCAL_KUBECONFIG);
            local.exists().then(|| local.to_path_buf())
        })
    }
}

/// Sidecar configuration, read from un-prefixed environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct SidecarConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_workload_name")]
    pub deployment_name: String,

    #[serde(default = "default_workload_name")]
    pub container_name: String,

    /// Pod name from the downward API
    #[serde(default)]
    pub pod_name: Option<String>,

    /// Fallback for `pod_name`; the Pod's hostname is its name
    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default = "default_threshold")]
    pub resource_threshold_cpu_percent: f64,

    #[serde(default = "default_threshold")]
    pub resource_threshold_memory_percent: f64,

    #[serde(default = "default_minimum_pods")]
    pub minimum_pods_to_keep_percent: f64,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_collect_timeout")]
    pub collect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_workload_name() -> String {
    "app".to_string()
}

fn default_threshold() -> f64 {
    80.0
}

fn default_minimum_pods() -> f64 {
    50.0
}

fn default_http_port() -> u16 {
    8333
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_collect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_shutdown_grace() -> u64 {
    5
}

impl SidecarConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::build(config::Environment::default())
    }

    /// Load configuration from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(config::Environment::default().source(Some(vars)))
    }

    fn build(env: config::Environment) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("NAMESPACE", &self.namespace),
            ("DEPLOYMENT_NAME", &self.deployment_name),
            ("CONTAINER_NAME", &self.container_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Empty(name));
            }
        }
        self.thresholds().validate()
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            cpu_percent: self.resource_threshold_cpu_percent,
            memory_percent: self.resource_threshold_memory_percent,
            minimum_available_percent: self.minimum_pods_to_keep_percent,
        }
    }

    pub fn target(&self) -> TargetRef {
        let pod_name = [&self.pod_name, &self.hostname]
            .into_iter()
            .flatten()
            .find(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        TargetRef {
            namespace: self.namespace.clone(),
            deployment_name: self.deployment_name.clone(),
            container_name: self.container_name.clone(),
            pod_name,
        }
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.collect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
