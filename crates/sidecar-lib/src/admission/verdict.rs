//! Admission verdicts

use super::Ratios;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome label of one admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionStatus {
    /// Resources are within thresholds
    Healthy,
    /// The watched container reports not ready
    NotReady,
    /// Too few Deployment replicas are available to shed any traffic
    PodShortage,
    /// Overloaded and this sidecar rejects traffic for the episode
    ResourceExhausted,
    /// Overloaded but the backoff draw kept this replica serving
    ResourceOverloadedButKeeping,
}

impl AdmissionStatus {
    pub const ALL: [AdmissionStatus; 5] = [
        AdmissionStatus::Healthy,
        AdmissionStatus::NotReady,
        AdmissionStatus::PodShortage,
        AdmissionStatus::ResourceExhausted,
        AdmissionStatus::ResourceOverloadedButKeeping,
    ];

    /// Whether the probe should answer success-coded.
    ///
    /// `NotReady` accepts as well: the sidecar fails open and leaves
    /// readiness of the main container to its own probe.
    pub fn accepts(&self) -> bool {
        !matches!(self, AdmissionStatus::ResourceExhausted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionStatus::Healthy => "HEALTHY",
            AdmissionStatus::NotReady => "NOT_READY",
            AdmissionStatus::PodShortage => "POD_SHORTAGE",
            AdmissionStatus::ResourceExhausted => "RESOURCE_EXHAUSTED",
            AdmissionStatus::ResourceOverloadedButKeeping => "RESOURCE_OVERLOADED_BUT_KEEPING",
        }
    }
}

impl fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionVerdict {
    pub status: AdmissionStatus,
    pub accept: bool,
    pub message: String,
    #[serde(flatten)]
    pub ratios: Ratios,
    /// Backoff draw made during this evaluation, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_draw: Option<f64>,
}

impl AdmissionVerdict {
    pub fn new(status: AdmissionStatus, message: impl Into<String>, ratios: Ratios) -> Self {
        Self {
            status,
            accept: status.accepts(),
            message: message.into(),
            ratios,
            random_draw: None,
        }
    }

    pub fn with_draw(mut self, draw: f64) -> Self {
        self.random_draw = Some(draw);
        self
    }
}
