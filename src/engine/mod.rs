//! Replica-exchange engine and its supporting pieces.

pub mod replex;
pub mod shutdown;
pub mod swap;

pub use replex::{Extremum, ReplexEngine, ReplexError, ReplexOutcome, TemperatureSlot};
pub use shutdown::ShutdownManager;
pub use swap::{AcceptanceRule, AlwaysAccept, Metropolis, SwapCandidate};
