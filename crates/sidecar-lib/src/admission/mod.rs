//! Admission decision engine
//!
//! Turns a [`ResourceSnapshot`](crate::models::ResourceSnapshot) into an
//! accept/reject verdict. Decisions are deterministic except for the
//! overload branch, where each sidecar draws once per overload episode and
//! keeps a reject draw until the overload clears. Across a fleet of
//! independent sidecars this leaves roughly `minimum_available_percent` of the
//! replicas serving during an episode.

mod engine;
mod ratio;
mod verdict;

#[cfg(test)]
mod tests;

pub use engine::{AdmissionEngine, BackoffState, EntropySource, RandomSource, Thresholds};
pub use ratio::{available_percent, cpu_percent, memory_percent, percent, Ratios};
pub use verdict::{AdmissionStatus, AdmissionVerdict};
