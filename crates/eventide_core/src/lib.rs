//! # Eventide Core
//!
//! The event-driven kernel for Eventide, a particle simulator in which
//! particles move on straight lines between discrete events.
//!
//! This crate contains the deterministic simulation logic, including:
//! - Root finding for pair and wall event prediction
//! - The per-particle event schedule with lazy invalidation
//! - The capture ledger for bonded pairs of state-dependent potentials
//! - The kernel loop, sleep/wake handling, thermostat and ticker systems
//! - Output plugins and structured logging
//!
//! ## Example
//!
//! ```
//! use eventide_core::interaction::{HardSphere, Interaction, InteractionKind};
//! use eventide_core::range::PairRange;
//! use eventide_core::Simulation;
//! use eventide_data::{Particle, Species, Vec3};
//!
//! let mut sim = Simulation::builder()
//!     .species(Species::new("A", 1.0))
//!     .interaction(Interaction::new(
//!         "Bulk",
//!         PairRange::All,
//!         InteractionKind::HardSphere(HardSphere { diameter: 1.0, elasticity: 1.0 }),
//!     ))
//!     .particle(Particle::new(0, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0))
//!     .particle(Particle::new(1, Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), 0))
//!     .build();
//!
//! sim.initialise().unwrap();
//! sim.run_next_event().unwrap();
//! assert!((sim.time() - 0.5).abs() < 1e-12);
//! ```

/// Capture ledger of bonded particle pairs
pub mod capture;
/// Neighbour cell grid for periodic boxes
pub mod cells;
/// Configuration management for simulation runs
pub mod config;
/// Streaming, boundary conditions and pair kinematics
pub mod dynamics;
/// Kernel consistency errors
pub mod error;
/// Pair interaction kinds and the provider trait
pub mod interaction;
/// Walls and other single-particle obstacles
pub mod local;
/// Performance metrics collection and logging
pub mod metrics;
/// Output plugins observing executed events
pub mod observer;
/// Initial configuration generation
pub mod packer;
/// Particle and pair selectors
pub mod range;
/// Quadratic root finding for event prediction
pub mod roots;
/// Event schedule with lazy invalidation
pub mod schedule;
/// The simulation kernel and its builder
pub mod simulation;
/// Serializable simulation state
pub mod snapshot;
/// Sleep, thermostat and ticker systems
pub mod systems;

pub use capture::CaptureLedger;
pub use config::RunConfig;
pub use error::{KernelError, KernelResult};
pub use metrics::{init_logging, init_logging_with, Metrics};
pub use simulation::{RunLimits, SimStatus, Simulation, SimulationBuilder, StopReason};
pub use snapshot::Snapshot;
