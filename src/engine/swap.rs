//! Swap pair selection and acceptance rules.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// What an acceptance rule sees of one side of a proposed swap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapCandidate {
    /// Temperature of the slot.
    pub temperature: f64,
    /// Total energy of the configuration currently in the slot.
    pub total_energy: f64,
    /// Internal (potential) energy of that configuration.
    pub internal_energy: f64,
}

/// Decides whether two slots exchange configurations.
pub trait AcceptanceRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn accept(&self, a: &SwapCandidate, b: &SwapCandidate, rng: &mut ChaCha8Rng) -> bool;
}

/// Parallel tempering Metropolis test, `min(1, exp((1/Ta - 1/Tb)(Ea - Eb)))`.
///
/// With velocity rescaling the kinetic parts cancel and only the internal
/// energy enters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metropolis {
    pub internal_only: bool,
}

impl Metropolis {
    pub fn new(rescale_velocities: bool) -> Self {
        Self {
            internal_only: rescale_velocities,
        }
    }

    pub fn exponent(&self, a: &SwapCandidate, b: &SwapCandidate) -> f64 {
        let (ea, eb) = if self.internal_only {
            (a.internal_energy, b.internal_energy)
        } else {
            (a.total_energy, b.total_energy)
        };
        (1.0 / a.temperature - 1.0 / b.temperature) * (ea - eb)
    }
}

impl AcceptanceRule for Metropolis {
    fn name(&self) -> &'static str {
        "metropolis"
    }

    fn accept(&self, a: &SwapCandidate, b: &SwapCandidate, rng: &mut ChaCha8Rng) -> bool {
        let x = self.exponent(a, b);
        if x >= 0.0 {
            return true;
        }
        rng.gen::<f64>() < x.exp()
    }
}

/// Accepts every proposal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAccept;

impl AcceptanceRule for AlwaysAccept {
    fn name(&self) -> &'static str {
        "always"
    }

    fn accept(&self, _: &SwapCandidate, _: &SwapCandidate, _: &mut ChaCha8Rng) -> bool {
        true
    }
}

/// Neighbouring slot pairs starting at offset 0 or 1.
pub fn alternating_pairs(slots: usize, odd: bool) -> Vec<(usize, usize)> {
    let start = usize::from(odd);
    (start..slots.saturating_sub(1))
        .step_by(2)
        .map(|i| (i, i + 1))
        .collect()
}

/// One random neighbouring pair.
pub fn single_pair(rng: &mut ChaCha8Rng, slots: usize) -> Option<(usize, usize)> {
    if slots < 2 {
        return None;
    }
    let i = rng.gen_range(0..slots - 1);
    Some((i, i + 1))
}

/// `count` random pairs of distinct slots.
pub fn random_pairs(rng: &mut ChaCha8Rng, slots: usize, count: usize) -> Vec<(usize, usize)> {
    if slots < 2 {
        return Vec::new();
    }
    (0..count)
        .map(|_| {
            let i = rng.gen_range(0..slots);
            let mut j = rng.gen_range(0..slots - 1);
            if j >= i {
                j += 1;
            }
            (i.min(j), i.max(j))
        })
        .collect()
}
