//! Capture ledger: which particle pairs are currently bonded.
//!
//! Pairs are unordered. Each entry remembers the interaction that created it,
//! and the ledger is the only place the kernel looks to decide which branch
//! of a state-dependent potential a pair is on.

use eventide_data::ParticleId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureLedger {
    pairs: BTreeMap<(ParticleId, ParticleId), usize>,
}

#[inline]
fn key(a: ParticleId, b: ParticleId) -> (ParticleId, ParticleId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl CaptureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_captured(&self, a: ParticleId, b: ParticleId) -> bool {
        self.pairs.contains_key(&key(a, b))
    }

    /// Records a capture. Returns false if the pair was already captured.
    pub fn capture(&mut self, a: ParticleId, b: ParticleId, interaction: usize) -> bool {
        self.pairs.insert(key(a, b), interaction).is_none()
    }

    /// Drops a capture, returning the interaction that owned it.
    pub fn release(&mut self, a: ParticleId, b: ParticleId) -> Option<usize> {
        self.pairs.remove(&key(a, b))
    }

    /// Number of captures owned by one interaction.
    pub fn count(&self, interaction: usize) -> usize {
        self.pairs.values().filter(|&&i| i == interaction).count()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// `(a, b, interaction)` with `a < b`, in ascending pair order.
    pub fn entries(&self) -> impl Iterator<Item = (ParticleId, ParticleId, usize)> + '_ {
        self.pairs.iter().map(|(&(a, b), &i)| (a, b, i))
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (ParticleId, ParticleId, usize)>,
    {
        let mut ledger = Self::new();
        for (a, b, i) in entries {
            ledger.capture(a, b, i);
        }
        ledger
    }
}
