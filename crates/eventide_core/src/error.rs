//! Consistency errors raised by the event kernel.
//!
//! Numerical non-events (no root) are never errors; they surface as the
//! absence of an event. Everything in here aborts the current run.

use eventide_data::{EventType, ParticleId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// An event was found earlier than the current time by more than the tolerance.
    #[error(
        "reverse event {event_type} for particles {particle1}/{particle2:?}: \
         dt = {dt:e} at time {time}"
    )]
    ReverseEvent {
        event_type: EventType,
        particle1: ParticleId,
        particle2: Option<ParticleId>,
        dt: f64,
        time: f64,
    },

    /// A pair event was about to run against a capture state it was not predicted for.
    #[error(
        "stale {event_type} between particles {particle1} and {particle2} at time {time}: \
         predicted with captured = {predicted_captured}, ledger says {captured}"
    )]
    StaleState {
        event_type: EventType,
        particle1: ParticleId,
        particle2: ParticleId,
        predicted_captured: bool,
        captured: bool,
        time: f64,
    },

    /// Two resting particles were handed an event.
    #[error("resting particles {particle1} and {particle2} paired at time {time}")]
    StaticPair {
        particle1: ParticleId,
        particle2: ParticleId,
        time: f64,
    },

    #[error("configuration error: {0}")]
    Config(String),

    /// An operation was called in the wrong lifecycle state.
    #[error("simulation is {actual}, expected {expected}")]
    BadState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("particles {particle1} and {particle2} overlap (distance {distance}, limit {limit})")]
    Overlap {
        particle1: ParticleId,
        particle2: ParticleId,
        distance: f64,
        limit: f64,
    },

    #[error("simulation has no particles")]
    NoParticles,
}

impl KernelError {
    #[must_use]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// True for failures that indicate a broken schedule rather than bad input.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            Self::ReverseEvent { .. } | Self::StaleState { .. } | Self::StaticPair { .. }
        )
    }
}

pub type KernelResult<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_pair_and_time() {
        let err = KernelError::StaleState {
            event_type: EventType::WellOut,
            particle1: 3,
            particle2: 8,
            predicted_captured: true,
            captured: false,
            time: 12.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("3") && msg.contains("8"));
        assert!(msg.contains("12.5"));
        assert!(err.is_consistency_violation());
    }

    #[test]
    fn test_config_error_is_not_consistency_violation() {
        assert!(!KernelError::config("no species").is_consistency_violation());
        assert!(!KernelError::NoParticles.is_consistency_violation());
    }
}
