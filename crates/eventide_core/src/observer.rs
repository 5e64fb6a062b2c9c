//! Output plugins: read-only observers of executed events.
//!
//! Plugins see each executed event together with the per-particle changes it
//! caused, plus a borrowed view of the simulation. They cannot reach the
//! schedule or mutate particles.

use eventide_data::{EventData, EventKind, EventType, Particle, Species, Vec3};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Instant;

/// Borrowed view of a simulation handed to plugins.
pub struct PluginContext<'a> {
    pub time: f64,
    pub event_count: u64,
    pub particles: &'a [Particle],
    pub species: &'a [Species],
    pub kinetic_energy: f64,
    pub internal_energy: f64,
}

impl PluginContext<'_> {
    /// Kinetic temperature, `2 KE / (3 N)` with `k_B = 1`.
    pub fn temperature(&self) -> f64 {
        if self.particles.is_empty() {
            return 0.0;
        }
        2.0 * self.kinetic_energy / (3.0 * self.particles.len() as f64)
    }
}

pub trait OutputPlugin: Send {
    fn name(&self) -> &'static str;

    fn initialise(&mut self, _ctx: &PluginContext<'_>) {}

    /// Called once for every executed event.
    fn event_update(&mut self, data: &EventData, ctx: &PluginContext<'_>);

    /// Called by the ticker system.
    fn ticker(&mut self, _ctx: &PluginContext<'_>) {}

    /// Called at the progress reporting cadence.
    fn periodic_output(&mut self, _ctx: &PluginContext<'_>) {}

    fn summary(&self, ctx: &PluginContext<'_>) -> Value;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EffectTally {
    pub count: u64,
    pub delta_ke: f64,
    pub delta_momentum: Vec3,
}

/// Count, kinetic energy change and momentum change per event kind and type.
#[derive(Debug, Default)]
pub struct EventEffects {
    tallies: BTreeMap<(EventKind, EventType), EffectTally>,
}

impl EventEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tally(&self, kind: EventKind, event_type: EventType) -> Option<&EffectTally> {
        self.tallies.get(&(kind, event_type))
    }
}

impl OutputPlugin for EventEffects {
    fn name(&self) -> &'static str {
        "EventEffects"
    }

    fn event_update(&mut self, data: &EventData, _ctx: &PluginContext<'_>) {
        let tally = self
            .tallies
            .entry((data.event.kind, data.event.event_type))
            .or_default();
        tally.count += 1;
        for change in &data.changes {
            tally.delta_ke += change.delta_ke();
            tally.delta_momentum += change.delta_momentum();
        }
    }

    fn summary(&self, _ctx: &PluginContext<'_>) -> Value {
        let entries: Vec<Value> = self
            .tallies
            .iter()
            .map(|((kind, ty), tally)| {
                json!({
                    "kind": format!("{kind:?}"),
                    "type": ty.to_string(),
                    "count": tally.count,
                    "delta_ke": tally.delta_ke,
                    "delta_momentum": tally.delta_momentum,
                })
            })
            .collect();
        Value::Array(entries)
    }
}

/// Counts events that ran with a negative delay inside the tolerance window.
#[derive(Debug, Default)]
pub struct ReverseEventsCheck {
    pub reverse_count: u64,
    pub worst_dt: f64,
}

impl ReverseEventsCheck {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputPlugin for ReverseEventsCheck {
    fn name(&self) -> &'static str {
        "ReverseEvents"
    }

    fn event_update(&mut self, data: &EventData, _ctx: &PluginContext<'_>) {
        if data.event.dt < 0.0 {
            self.reverse_count += 1;
            self.worst_dt = self.worst_dt.min(data.event.dt);
            tracing::debug!(
                event = %data.event,
                time = data.time,
                "Event ran with a negative delay"
            );
        }
    }

    fn summary(&self, _ctx: &PluginContext<'_>) -> Value {
        json!({ "count": self.reverse_count, "worst_dt": self.worst_dt })
    }
}

/// Event count, simulated time, event rate and energies.
#[derive(Debug)]
pub struct Misc {
    started: Instant,
    start_time: f64,
    start_events: u64,
    events: u64,
}

impl Default for Misc {
    fn default() -> Self {
        Self::new()
    }
}

impl Misc {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            start_time: 0.0,
            start_events: 0,
            events: 0,
        }
    }

    pub fn events(&self) -> u64 {
        self.events
    }
}

impl OutputPlugin for Misc {
    fn name(&self) -> &'static str {
        "Misc"
    }

    fn initialise(&mut self, ctx: &PluginContext<'_>) {
        self.started = Instant::now();
        self.start_time = ctx.time;
        self.start_events = ctx.event_count;
    }

    fn event_update(&mut self, _data: &EventData, _ctx: &PluginContext<'_>) {
        self.events += 1;
    }

    fn periodic_output(&mut self, ctx: &PluginContext<'_>) {
        let elapsed = ctx.time - self.start_time;
        let mft = if self.events > 0 {
            elapsed * ctx.particles.len() as f64 / (2.0 * self.events as f64)
        } else {
            f64::INFINITY
        };
        tracing::info!(
            events = ctx.event_count,
            time = ctx.time,
            temperature = ctx.temperature(),
            mean_free_time = mft,
            "Misc"
        );
    }

    fn summary(&self, ctx: &PluginContext<'_>) -> Value {
        let wall = self.started.elapsed().as_secs_f64();
        let rate = if wall > 0.0 {
            self.events as f64 / wall
        } else {
            0.0
        };
        json!({
            "events": self.events,
            "total_events": ctx.event_count,
            "start_time": self.start_time,
            "time": ctx.time,
            "events_per_second": rate,
            "kinetic_energy": ctx.kinetic_energy,
            "internal_energy": ctx.internal_energy,
            "temperature": ctx.temperature(),
            "particles": ctx.particles.len(),
            "species": ctx.species.len(),
            "resting": ctx.particles.iter().filter(|p| !p.is_dynamic()).count(),
            "events_this_run": ctx.event_count.saturating_sub(self.start_events),
        })
    }
}
