//! Decision engine and sticky backoff state

use super::{AdmissionStatus, AdmissionVerdict, Ratios};
use crate::error::ConfigError;
use crate::models::ResourceSnapshot;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Static thresholds the engine evaluates against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// CPU usage percentage above which the container is under pressure
    pub cpu_percent: f64,
    /// Memory usage percentage above which the container is under pressure
    pub memory_percent: f64,
    /// Floor for the Deployment's available-replica percentage, and the
    /// probability (0-100) that a sidecar keeps serving during an overload
    pub minimum_available_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 80.0,
            memory_percent: 80.0,
            minimum_available_percent: 50.0,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("cpu threshold", self.cpu_percent),
            ("memory threshold", self.memory_percent),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        let minimum = self.minimum_available_percent;
        if !(0.0..=100.0).contains(&minimum) {
            return Err(ConfigError::OutOfRange {
                name: "minimum available percent",
                value: minimum,
            });
        }

        Ok(())
    }

    /// Both CPU and memory must breach; a single-resource spike does not count
    pub fn is_overloaded(&self, ratios: &Ratios) -> bool {
        ratios.cpu_percent > self.cpu_percent && ratios.memory_percent > self.memory_percent
    }
}

/// Source of backoff draws
pub trait RandomSource: Send {
    /// Uniform draw from `[0, 100)`
    fn draw_percent(&mut self) -> f64;
}

/// Entropy-seeded generator used in production
pub struct EntropySource(StdRng);

impl EntropySource {
    pub fn new() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl Default for EntropySource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for EntropySource {
    fn draw_percent(&mut self) -> f64 {
        self.0.gen_range(0.0..100.0)
    }
}

/// Sticky backoff flag kept for the lifetime of the process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackoffState {
    /// A fresh draw is made on the next overloaded evaluation
    #[default]
    Unlocked,
    /// A draw rejected; overloaded evaluations reject until the overload clears
    LockedReject,
}

struct EngineState {
    backoff: BackoffState,
    rng: Box<dyn RandomSource>,
}

/// Evaluates snapshots against [`Thresholds`].
///
/// The backoff flag and the random source live behind one mutex, so every
/// read, draw and transition of a single evaluation happens atomically with
/// respect to concurrent probes.
pub struct AdmissionEngine {
    thresholds: Thresholds,
    state: Mutex<EngineState>,
}

impl AdmissionEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self::with_random_source(thresholds, EntropySource::new())
    }

    pub fn with_random_source(thresholds: Thresholds, rng: impl RandomSource + 'static) -> Self {
        Self {
            thresholds,
            state: Mutex::new(EngineState {
                backoff: BackoffState::Unlocked,
                rng: Box::new(rng),
            }),
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn backoff_state(&self) -> BackoffState {
        self.lock().backoff
    }

    /// Evaluate one snapshot. First matching rule wins.
    pub fn evaluate(&self, snapshot: &ResourceSnapshot) -> AdmissionVerdict {
        self.evaluate_with_state(snapshot).0
    }

    /// Evaluate one snapshot and report the backoff state it left behind,
    /// both taken under the same lock.
    pub fn evaluate_with_state(
        &self,
        snapshot: &ResourceSnapshot,
    ) -> (AdmissionVerdict, BackoffState) {
        let mut state = self.lock();
        let verdict = self.decide(&mut state, snapshot);
        (verdict, state.backoff)
    }

    fn decide(&self, state: &mut EngineState, snapshot: &ResourceSnapshot) -> AdmissionVerdict {
        let ratios = Ratios::of(snapshot);
        let t = &self.thresholds;

        if !snapshot.container_ready {
            return AdmissionVerdict::new(
                AdmissionStatus::NotReady,
                format!("container {} is not ready", snapshot.container_name),
                ratios,
            );
        }

        if ratios.available_percent < t.minimum_available_percent {
            return AdmissionVerdict::new(
                AdmissionStatus::PodShortage,
                format!(
                    "available pods ({}/{} = {:.2}%) below minimum threshold ({:.2}%)",
                    snapshot.deployment_available_replicas,
                    snapshot.deployment_replicas,
                    ratios.available_percent,
                    t.minimum_available_percent
                ),
                ratios,
            );
        }

        if !t.is_overloaded(&ratios) {
            if state.backoff == BackoffState::LockedReject {
                info!("Overload cleared, backoff unlocked");
            }
            state.backoff = BackoffState::Unlocked;
            return AdmissionVerdict::new(
                AdmissionStatus::Healthy,
                format!(
                    "health check passed: memory usage {:.2}%, cpu usage {:.2}%, pod availability {:.2}%",
                    ratios.memory_percent, ratios.cpu_percent, ratios.available_percent
                ),
                ratios,
            );
        }

        if state.backoff == BackoffState::LockedReject {
            debug!("Backoff locked, rejecting without a new draw");
            return exhausted(t, ratios);
        }

        let draw = state.rng.draw_percent();
        if draw > t.minimum_available_percent {
            state.backoff = BackoffState::LockedReject;
            info!(
                event = "backoff_draw",
                draw = draw,
                threshold = t.minimum_available_percent,
                locked = true,
                "Backoff draw above threshold, rejecting for the rest of the overload"
            );
            return exhausted(t, ratios).with_draw(draw);
        }

        info!(
            event = "backoff_draw",
            draw = draw,
            threshold = t.minimum_available_percent,
            locked = false,
            "Backoff draw within threshold, keeping traffic"
        );
        AdmissionVerdict::new(
            AdmissionStatus::ResourceOverloadedButKeeping,
            format!(
                "resource usage high but backoff kept serving: memory usage {:.2}%, cpu usage {:.2}%, draw {:.2}",
                ratios.memory_percent, ratios.cpu_percent, draw
            ),
            ratios,
        )
        .with_draw(draw)
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        // State is a flag and an RNG; a panicked holder cannot leave it torn
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn exhausted(t: &Thresholds, ratios: Ratios) -> AdmissionVerdict {
    AdmissionVerdict::new(
        AdmissionStatus::ResourceExhausted,
        format!(
            "resource usage too high: memory usage {:.2}% (threshold: {:.2}%), cpu usage {:.2}% (threshold: {:.2}%)",
            ratios.memory_percent, t.memory_percent, ratios.cpu_percent, t.cpu_percent
        ),
        ratios,
    )
}
