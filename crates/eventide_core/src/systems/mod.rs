//! Systems: scheduled or reactive events that are not tied to a pair.

pub mod sleep;
pub mod thermostat;
pub mod ticker;

pub use sleep::{SleepAction, SleepSystem};
pub use thermostat::Andersen;
pub use ticker::Ticker;

use eventide_data::EventType;

/// Closed set of system kinds a simulation can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum System {
    Sleep(SleepSystem),
    Thermostat(Andersen),
    Ticker(Ticker),
}

impl System {
    pub fn name(&self) -> &str {
        match self {
            Self::Sleep(s) => &s.name,
            Self::Thermostat(_) => "Thermostat",
            Self::Ticker(_) => "Ticker",
        }
    }

    /// Event type the schedule shows for this system.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Sleep(_) => EventType::Sleep,
            Self::Thermostat(_) => EventType::Thermostat,
            Self::Ticker(_) => EventType::Ticker,
        }
    }
}
