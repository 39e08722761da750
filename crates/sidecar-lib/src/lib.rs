//! Library for the metrics sidecar
//!
//! This crate provides the core functionality for:
//! - Resource snapshot collection from the Kubernetes and metrics APIs
//! - The admission decision engine with its sticky randomized backoff
//! - The `/healthz` and `/metrics` HTTP surface
//! - Observability (Prometheus metrics and structured logging)

pub mod admission;
pub mod api;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod provider;

pub use admission::{
    AdmissionEngine, AdmissionStatus, AdmissionVerdict, BackoffState, RandomSource, Thresholds,
};
pub use error::{CollectError, ConfigError, ProviderError, StartupError};
pub use health::HealthReport;
pub use models::*;
pub use observability::{SidecarMetrics, StructuredLogger};
pub use provider::{collect_snapshot, SnapshotProvider};
