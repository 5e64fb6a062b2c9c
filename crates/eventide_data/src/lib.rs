//! # Eventide Data
//!
//! Plain data shared by every layer of the event-driven simulator: vectors,
//! particles, species and the tagged event values that flow between the
//! schedule, the kernel loop and the output plugins.

pub mod data;

pub use data::event::{Event, EventKind, EventType};
pub use data::particle::{Particle, ParticleId, ParticleState, Species};
pub use data::update::{EventData, ParticleDelta};
pub use data::vector::Vec3;
