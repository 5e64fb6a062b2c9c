//! Single-particle obstacles ("locals").

use crate::range::ParticleRange;
use eventide_data::{Particle, Vec3};
use serde::{Deserialize, Serialize};

/// An infinite plane particles bounce off.
///
/// Particles live on the side `normal` points to; a particle's centre stays
/// at least `offset` away from the plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub name: String,
    pub origin: Vec3,
    pub normal: Vec3,
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "one")]
    pub elasticity: f64,
    #[serde(default)]
    pub range: ParticleRange,
}

fn one() -> f64 {
    1.0
}

impl Wall {
    pub fn new(name: impl Into<String>, origin: Vec3, normal: Vec3, offset: f64) -> Self {
        Self {
            name: name.into(),
            origin,
            normal: normal.normalized(),
            offset,
            elasticity: 1.0,
            range: ParticleRange::All,
        }
    }

    /// Signed distance of `p` beyond the contact plane.
    pub fn gap(&self, p: &Particle) -> f64 {
        (p.position - self.origin).dot(self.normal) - self.offset
    }

    /// Time until `p` hits the wall.
    pub fn predict(&self, p: &Particle) -> Option<f64> {
        if !p.is_dynamic() || !self.range.contains(p) {
            return None;
        }
        let vn = p.velocity.dot(self.normal);
        if vn >= 0.0 {
            return None;
        }
        Some((self.gap(p) / -vn).max(0.0))
    }

    /// Post-collision velocity.
    pub fn reflect(&self, v: Vec3) -> Vec3 {
        let vn = v.dot(self.normal);
        if vn >= 0.0 {
            return v;
        }
        v - self.normal * ((1.0 + self.elasticity) * vn)
    }

    /// The six inward-facing walls of a box of `size` centred on the origin.
    pub fn box_walls(size: Vec3, offset: f64) -> Vec<Wall> {
        let mut walls = Vec::with_capacity(6);
        for k in 0..3 {
            let axis = Vec3::axis(k);
            walls.push(Wall::new(
                format!("Low{}", ["X", "Y", "Z"][k]),
                axis * (-0.5 * size[k]),
                axis,
                offset,
            ));
            walls.push(Wall::new(
                format!("High{}", ["X", "Y", "Z"][k]),
                axis * (0.5 * size[k]),
                -axis,
                offset,
            ));
        }
        walls
    }
}
