//! Pair interactions.
//!
//! Each interaction kind implements [`InteractionProvider`]: it predicts the
//! next event for a pair given the pair's capture state, and computes the
//! post-event velocities when that event runs. The kernel never looks
//! inside a potential; everything it knows comes through this trait.

use crate::dynamics::PairState;
use crate::range::PairRange;
use eventide_data::{EventType, Vec3};
use serde::{Deserialize, Serialize};

/// What an executed pair event does to the capture ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTransition {
    None,
    Capture,
    Release,
}

/// Result of executing a pair event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairOutcome {
    /// Type that actually ran; a failed `WellOut` runs as a `Bounce`.
    pub event_type: EventType,
    pub v1: Vec3,
    pub v2: Vec3,
    pub transition: CaptureTransition,
    pub delta_internal: f64,
}

/// Capability every interaction kind provides to the kernel.
pub trait InteractionProvider {
    /// Largest separation at which the interaction can produce an event.
    fn max_distance(&self) -> f64;

    /// Closest approach allowed between two uncaptured particles.
    fn core_distance(&self) -> f64;

    /// Whether this interaction keeps pairs in the capture ledger.
    fn is_capturing(&self) -> bool {
        false
    }

    /// Whether a pair at this separation starts out captured.
    fn capture_test(&self, _pair: &PairState) -> bool {
        false
    }

    /// Next event for the pair, `None` when there is none.
    fn predict(&self, pair: &PairState, captured: bool, precision: f64)
        -> Option<(f64, EventType)>;

    /// Applies a predicted event to the pair.
    fn execute(&self, event_type: EventType, pair: &PairState) -> PairOutcome;

    /// Potential energy held by `captures` captured pairs.
    fn internal_energy(&self, _captures: usize) -> f64 {
        0.0
    }

    /// The limit a pair violates, if it overlaps.
    fn overlap(&self, pair: &PairState, captured: bool) -> Option<f64> {
        let _ = captured;
        let d = self.core_distance();
        (d > 0.0 && pair.rij.nrm2() < d * d * (1.0 - 1e-10)).then_some(d)
    }
}

fn elastic(pair: &PairState, elasticity: f64) -> PairOutcome {
    let vr = pair.radial_velocity();
    let (v1, v2) = if vr < 0.0 {
        pair.kick_radial(-elasticity * vr)
    } else {
        (pair.v1, pair.v2)
    };
    PairOutcome {
        event_type: EventType::Core,
        v1,
        v2,
        transition: CaptureTransition::None,
        delta_internal: 0.0,
    }
}

/// Crossing of a square step of height `depth` at a capture shell.
fn step(pair: &PairState, event_type: EventType, depth: f64) -> PairOutcome {
    let mu = pair.reduced_mass();
    let vr = pair.radial_velocity();

    match event_type {
        EventType::WellIn => {
            let vr_new = -(vr * vr + 2.0 * depth / mu).sqrt();
            let (v1, v2) = pair.kick_radial(vr_new);
            PairOutcome {
                event_type,
                v1,
                v2,
                transition: CaptureTransition::Capture,
                delta_internal: -depth,
            }
        }
        _ => {
            let arg = vr * vr - 2.0 * depth / mu;
            if arg < 0.0 {
                let (v1, v2) = pair.kick_radial(-vr);
                PairOutcome {
                    event_type: EventType::Bounce,
                    v1,
                    v2,
                    transition: CaptureTransition::None,
                    delta_internal: 0.0,
                }
            } else {
                let (v1, v2) = pair.kick_radial(arg.sqrt());
                PairOutcome {
                    event_type: EventType::WellOut,
                    v1,
                    v2,
                    transition: CaptureTransition::Release,
                    delta_internal: depth,
                }
            }
        }
    }
}

fn default_elasticity() -> f64 {
    1.0
}

/// Smooth hard spheres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardSphere {
    pub diameter: f64,
    #[serde(default = "default_elasticity")]
    pub elasticity: f64,
}

impl InteractionProvider for HardSphere {
    fn max_distance(&self) -> f64 {
        self.diameter
    }

    fn core_distance(&self) -> f64 {
        self.diameter
    }

    fn predict(&self, pair: &PairState, _: bool, precision: f64) -> Option<(f64, EventType)> {
        let t = pair.sphere(self.diameter).next_entry(precision);
        t.is_finite().then_some((t, EventType::Core))
    }

    fn execute(&self, _: EventType, pair: &PairState) -> PairOutcome {
        elastic(pair, self.elasticity)
    }
}

/// Hard core inside an attractive square well of width `lambda * diameter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquareWell {
    pub diameter: f64,
    pub lambda: f64,
    pub well_depth: f64,
    #[serde(default = "default_elasticity")]
    pub elasticity: f64,
}

impl SquareWell {
    fn well_diameter(&self) -> f64 {
        self.lambda * self.diameter
    }
}

impl InteractionProvider for SquareWell {
    fn max_distance(&self) -> f64 {
        self.well_diameter()
    }

    fn core_distance(&self) -> f64 {
        self.diameter
    }

    fn is_capturing(&self) -> bool {
        true
    }

    fn capture_test(&self, pair: &PairState) -> bool {
        let w = self.well_diameter();
        pair.rij.nrm2() < w * w
    }

    fn predict(&self, pair: &PairState, captured: bool, precision: f64) -> Option<(f64, EventType)> {
        if !captured {
            let t = pair.sphere(self.well_diameter()).next_entry(precision);
            return t.is_finite().then_some((t, EventType::WellIn));
        }

        let core = pair.sphere(self.diameter).next_entry(precision);
        let out = pair.shell(self.well_diameter()).next_entry(precision);
        if core.is_finite() && core <= out {
            Some((core, EventType::Core))
        } else if out.is_finite() {
            Some((out, EventType::WellOut))
        } else {
            None
        }
    }

    fn execute(&self, event_type: EventType, pair: &PairState) -> PairOutcome {
        match event_type {
            EventType::Core => elastic(pair, self.elasticity),
            _ => step(pair, event_type, self.well_depth),
        }
    }

    fn internal_energy(&self, captures: usize) -> f64 {
        -(captures as f64 * self.well_depth)
    }
}

/// Penetrable sphere: a single capture shell with no hard core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftCore {
    pub diameter: f64,
    pub well_depth: f64,
}

impl InteractionProvider for SoftCore {
    fn max_distance(&self) -> f64 {
        self.diameter
    }

    fn core_distance(&self) -> f64 {
        0.0
    }

    fn is_capturing(&self) -> bool {
        true
    }

    fn capture_test(&self, pair: &PairState) -> bool {
        pair.rij.nrm2() < self.diameter * self.diameter
    }

    fn predict(&self, pair: &PairState, captured: bool, precision: f64) -> Option<(f64, EventType)> {
        let (t, event_type) = if captured {
            (
                pair.shell(self.diameter).next_entry(precision),
                EventType::WellOut,
            )
        } else {
            (
                pair.sphere(self.diameter).next_entry(precision),
                EventType::WellIn,
            )
        };
        t.is_finite().then_some((t, event_type))
    }

    fn execute(&self, event_type: EventType, pair: &PairState) -> PairOutcome {
        step(pair, event_type, self.well_depth)
    }

    fn internal_energy(&self, captures: usize) -> f64 {
        -(captures as f64 * self.well_depth)
    }
}

/// Axis-aligned hard cubes of side `width`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelCubes {
    pub width: f64,
    #[serde(default = "default_elasticity")]
    pub elasticity: f64,
}

impl ParallelCubes {
    /// Axis whose face the pair touches: the one with the largest separation.
    fn contact_axis(rij: Vec3) -> usize {
        let mut axis = 0;
        for k in 1..3 {
            if rij[k].abs() > rij[axis].abs() {
                axis = k;
            }
        }
        axis
    }
}

impl InteractionProvider for ParallelCubes {
    fn max_distance(&self) -> f64 {
        self.width * 3f64.sqrt()
    }

    fn core_distance(&self) -> f64 {
        self.width
    }

    fn predict(&self, pair: &PairState, _: bool, _precision: f64) -> Option<(f64, EventType)> {
        let (r, v) = (pair.rij, pair.vij());
        let mut t_in = f64::NEG_INFINITY;
        let mut t_out = f64::INFINITY;

        for k in 0..3 {
            if v[k] == 0.0 {
                if r[k].abs() >= self.width {
                    return None;
                }
                continue;
            }
            let t1 = (-self.width - r[k]) / v[k];
            let t2 = (self.width - r[k]) / v[k];
            t_in = t_in.max(t1.min(t2));
            t_out = t_out.min(t1.max(t2));
        }

        if t_in >= t_out || t_out <= 0.0 {
            return None;
        }
        if t_in < 0.0 {
            let k = Self::contact_axis(r);
            return (r[k] * v[k] < 0.0).then_some((0.0, EventType::Core));
        }
        Some((t_in, EventType::Core))
    }

    fn execute(&self, _: EventType, pair: &PairState) -> PairOutcome {
        let k = Self::contact_axis(pair.rij);
        let normal = Vec3::axis(k) * pair.rij[k].signum();
        let vn = normal.dot(pair.vij());
        let (v1, v2) = if vn < 0.0 {
            pair.kick_along(normal, -self.elasticity * vn)
        } else {
            (pair.v1, pair.v2)
        };
        PairOutcome {
            event_type: EventType::Core,
            v1,
            v2,
            transition: CaptureTransition::None,
            delta_internal: 0.0,
        }
    }

    fn overlap(&self, pair: &PairState, _: bool) -> Option<f64> {
        let limit = self.width * (1.0 - 1e-10);
        (0..3)
            .all(|k| pair.rij[k].abs() < limit)
            .then_some(self.width)
    }
}

/// Closed set of interaction kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionKind {
    HardSphere(HardSphere),
    SquareWell(SquareWell),
    SoftCore(SoftCore),
    ParallelCubes(ParallelCubes),
}

macro_rules! dispatch {
    ($self:ident, $inner:ident => $body:expr) => {
        match $self {
            InteractionKind::HardSphere($inner) => $body,
            InteractionKind::SquareWell($inner) => $body,
            InteractionKind::SoftCore($inner) => $body,
            InteractionKind::ParallelCubes($inner) => $body,
        }
    };
}

impl InteractionProvider for InteractionKind {
    fn max_distance(&self) -> f64 {
        dispatch!(self, i => i.max_distance())
    }

    fn core_distance(&self) -> f64 {
        dispatch!(self, i => i.core_distance())
    }

    fn is_capturing(&self) -> bool {
        dispatch!(self, i => i.is_capturing())
    }

    fn capture_test(&self, pair: &PairState) -> bool {
        dispatch!(self, i => i.capture_test(pair))
    }

    fn predict(&self, pair: &PairState, captured: bool, precision: f64) -> Option<(f64, EventType)> {
        dispatch!(self, i => i.predict(pair, captured, precision))
    }

    fn execute(&self, event_type: EventType, pair: &PairState) -> PairOutcome {
        dispatch!(self, i => i.execute(event_type, pair))
    }

    fn internal_energy(&self, captures: usize) -> f64 {
        dispatch!(self, i => i.internal_energy(captures))
    }

    fn overlap(&self, pair: &PairState, captured: bool) -> Option<f64> {
        dispatch!(self, i => i.overlap(pair, captured))
    }
}

/// A named interaction and the pairs it governs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub name: String,
    #[serde(default)]
    pub range: PairRange,
    #[serde(flatten)]
    pub kind: InteractionKind,
}

impl Interaction {
    pub fn new(name: impl Into<String>, range: PairRange, kind: InteractionKind) -> Self {
        Self {
            name: name.into(),
            range,
            kind,
        }
    }
}
