//! Usage and availability ratios
//!
//! All calculators are total: a non-positive denominator yields `0.0`, so a
//! missing limit or an empty Deployment can never produce NaN or infinity.
//! Values are not clamped and may exceed 100.

use crate::models::ResourceSnapshot;
use serde::{Deserialize, Serialize};

/// `part / whole * 100`, or `0.0` when `whole <= 0`
pub fn percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    part / whole * 100.0
}

pub fn cpu_percent(snapshot: &ResourceSnapshot) -> f64 {
    percent(
        snapshot.container_cpu_usage as f64,
        snapshot.container_cpu_limit as f64,
    )
}

pub fn memory_percent(snapshot: &ResourceSnapshot) -> f64 {
    percent(
        snapshot.container_mem_usage as f64,
        snapshot.container_mem_limit as f64,
    )
}

pub fn available_percent(snapshot: &ResourceSnapshot) -> f64 {
    percent(
        snapshot.deployment_available_replicas as f64,
        snapshot.deployment_replicas as f64,
    )
}

/// All derived percentages of one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ratios {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub available_percent: f64,
}

impl Ratios {
    pub fn of(snapshot: &ResourceSnapshot) -> Self {
        Self {
            cpu_percent: cpu_percent(snapshot),
            memory_percent: memory_percent(snapshot),
            available_percent: available_percent(snapshot),
        }
    }
}
