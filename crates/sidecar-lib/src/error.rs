//! Error types for snapshot collection and startup

use std::time::Duration;
use thiserror::Error;

/// Failure of a single provider query
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("kubernetes API request failed: {0}")]
    Kube(#[from] kube::Error),

    #[error("container {container} not found in {scope}")]
    ContainerNotFound { container: String, scope: String },

    #[error("invalid resource limits: cpu={cpu_millicores}m, memory={memory_mb}Mi")]
    InvalidLimits { cpu_millicores: i64, memory_mb: i64 },

    #[error("container resource limits not initialized")]
    LimitsNotInitialized,

    #[error("invalid quantity {0:?}")]
    Quantity(String),

    #[error("unexpected metrics payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure to build a usable snapshot for one request
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("unable to get container resource limits: {0}")]
    LimitsUnavailable(#[source] ProviderError),
}

/// Fatal errors raised before the server starts
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unable to get container resource limits after {attempts} attempts: {last}")]
    LimitsExhausted {
        attempts: u32,
        #[source]
        last: ProviderError,
    },

    #[error("metrics.k8s.io API is not available: {0}")]
    MetricsApiUnavailable(#[source] ProviderError),
}

/// Invalid sidecar configuration
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a finite, non-negative percentage, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("{name} must be between 0 and 100, got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}
