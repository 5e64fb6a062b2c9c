//! Particle and pair selectors.
//!
//! Ranges decide which particles a local or system acts on and which pairs
//! an interaction governs.

use eventide_data::{Particle, ParticleId};
use serde::{Deserialize, Serialize};

/// Selects a subset of particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParticleRange {
    #[default]
    All,
    None,
    Species { species: usize },
    /// Particle ids in `start..end`.
    Span { start: ParticleId, end: ParticleId },
    List { ids: Vec<ParticleId> },
}

impl ParticleRange {
    pub fn contains(&self, p: &Particle) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::Species { species } => p.species == *species,
            Self::Span { start, end } => (*start..*end).contains(&p.id),
            Self::List { ids } => ids.contains(&p.id),
        }
    }
}

/// Selects a set of unordered particle pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PairRange {
    #[default]
    All,
    /// Pairs with one particle of species `a` and the other of species `b`.
    Species { a: usize, b: usize },
    /// Pairs made of the particles at equal offsets within two chain groups
    /// `start1..start1 + length` and `start2..start2 + length`.
    ChainGroups {
        start1: ParticleId,
        start2: ParticleId,
        length: usize,
    },
}

impl PairRange {
    pub fn contains(&self, p1: &Particle, p2: &Particle) -> bool {
        match self {
            Self::All => true,
            Self::Species { a, b } => {
                (p1.species == *a && p2.species == *b) || (p1.species == *b && p2.species == *a)
            }
            Self::ChainGroups {
                start1,
                start2,
                length,
            } => {
                chain_partner(p1.id, *start1, *start2, *length) == Some(p2.id)
                    || chain_partner(p2.id, *start1, *start2, *length) == Some(p1.id)
            }
        }
    }

    /// Species indices this range refers to, for load-time validation.
    pub fn species_refs(&self) -> Vec<usize> {
        match self {
            Self::Species { a, b } => vec![*a, *b],
            _ => Vec::new(),
        }
    }
}

fn chain_partner(id: ParticleId, start1: usize, start2: usize, length: usize) -> Option<ParticleId> {
    if (start1..start1 + length).contains(&id) {
        Some(start2 + (id - start1))
    } else {
        None
    }
}
