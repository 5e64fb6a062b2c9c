//! # Eventide
//!
//! Run drivers on top of the event-driven kernel in `eventide_core`:
//! configuration-to-simulation setup, single runs, and the
//! replica-exchange engine that runs a temperature ladder of kernels on a
//! rayon pool with synchronized swap phases.

/// Simulation setup and the `run` / `replex` drivers
pub mod app;
/// Replica exchange, swap rules and cooperative shutdown
pub mod engine;
