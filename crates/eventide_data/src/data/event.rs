use super::particle::ParticleId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of the simulation generated an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// Two-particle event produced by an interaction.
    Interaction,
    /// Single-particle event from a global (e.g. a neighbour cell crossing).
    Global,
    /// Single-particle event from a local (e.g. a wall).
    Local,
    /// Event owned by a system (sleep, thermostat, ticker).
    System,
}

/// Kind-specific subtype of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// Hard core collision.
    Core,
    /// Failed escape from a captured state.
    Bounce,
    /// Pair enters a capture well.
    WellIn,
    /// Pair leaves a capture well.
    WellOut,
    Wall,
    Cell,
    Sleep,
    Resleep,
    Wakeup,
    Correct,
    Thermostat,
    Ticker,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A predicted event, relative to the schedule's current global time.
///
/// Events are transient: produced by prediction, consumed once by execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub dt: f64,
    pub kind: EventKind,
    pub event_type: EventType,
    pub particle1: ParticleId,
    pub particle2: Option<ParticleId>,
    /// Index of the interaction, global, local or system that owns the event.
    pub source: usize,
}

impl Event {
    pub fn interaction(
        dt: f64,
        event_type: EventType,
        p1: ParticleId,
        p2: ParticleId,
        source: usize,
    ) -> Self {
        Self {
            dt,
            kind: EventKind::Interaction,
            event_type,
            particle1: p1,
            particle2: Some(p2),
            source,
        }
    }

    pub fn single(
        dt: f64,
        kind: EventKind,
        event_type: EventType,
        particle: ParticleId,
        source: usize,
    ) -> Self {
        Self {
            dt,
            kind,
            event_type,
            particle1: particle,
            particle2: None,
            source,
        }
    }

    /// True if `id` takes part in this event.
    pub fn involves(&self, id: ParticleId) -> bool {
        self.particle1 == id || self.particle2 == Some(id)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.particle2 {
            Some(p2) => write!(
                f,
                "{:?}/{} between particles {} and {} (dt = {:e})",
                self.kind, self.event_type, self.particle1, p2, self.dt
            ),
            None => write!(
                f,
                "{:?}/{} for particle {} (dt = {:e})",
                self.kind, self.event_type, self.particle1, self.dt
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_involves() {
        let ev = Event::interaction(0.5, EventType::Core, 1, 4, 0);
        assert!(ev.involves(1));
        assert!(ev.involves(4));
        assert!(!ev.involves(2));
    }

    #[test]
    fn test_display_names_particles() {
        let ev = Event::interaction(0.5, EventType::WellIn, 7, 9, 0);
        let text = ev.to_string();
        assert!(text.contains("7") && text.contains("9"));
        assert!(text.contains("WellIn"));
    }
}
