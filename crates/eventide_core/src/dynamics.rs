//! Free-flight streaming, boundary conditions and impulse helpers.

use crate::roots::Quadratic;
use eventide_data::{Particle, Vec3};
use serde::{Deserialize, Serialize};

/// Boundary condition of the simulation box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Boundary {
    /// Unbounded space; separations are plain differences.
    #[default]
    Open,
    /// Periodic box centred on the origin.
    Periodic { size: Vec3 },
}

impl Boundary {
    /// Minimum-image separation `r1 - r2`.
    pub fn separation(&self, r1: Vec3, r2: Vec3) -> Vec3 {
        let mut d = r1 - r2;
        if let Self::Periodic { size } = self {
            for k in 0..3 {
                d[k] -= size[k] * (d[k] / size[k]).round();
            }
        }
        d
    }

    /// Folds a position back into the primary box.
    pub fn wrap(&self, mut r: Vec3) -> Vec3 {
        if let Self::Periodic { size } = self {
            for k in 0..3 {
                r[k] -= size[k] * (r[k] / size[k]).round();
            }
        }
        r
    }

    pub fn size(&self) -> Option<Vec3> {
        match self {
            Self::Open => None,
            Self::Periodic { size } => Some(*size),
        }
    }
}

/// Advances a dynamic particle along its straight-line trajectory.
///
/// Resting particles do not move.
#[inline]
pub fn stream_particle(p: &mut Particle, dt: f64) {
    if p.is_dynamic() && dt != 0.0 {
        p.position += p.velocity * dt;
    }
}

/// Velocity the predictors see: resting particles are stationary.
#[inline]
pub fn effective_velocity(p: &Particle) -> Vec3 {
    if p.is_dynamic() {
        p.velocity
    } else {
        Vec3::ZERO
    }
}

/// Relative kinematics of a pair at the current time.
///
/// `m1`/`m2` may be infinite for immovable colliders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairState {
    pub rij: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub m1: f64,
    pub m2: f64,
}

impl PairState {
    #[inline]
    pub fn vij(&self) -> Vec3 {
        self.v1 - self.v2
    }

    pub fn reduced_mass(&self) -> f64 {
        if self.m1.is_infinite() {
            self.m2
        } else if self.m2.is_infinite() {
            self.m1
        } else {
            self.m1 * self.m2 / (self.m1 + self.m2)
        }
    }

    /// Radial component of the relative velocity; negative when closing.
    pub fn radial_velocity(&self) -> f64 {
        self.rij.normalized().dot(self.vij())
    }

    /// `|rij + vij t|^2 - d^2`: positive outside a sphere of diameter `d`.
    pub fn sphere(&self, d: f64) -> Quadratic {
        let v = self.vij();
        Quadratic::new(v.nrm2(), 2.0 * self.rij.dot(v), self.rij.nrm2() - d * d)
    }

    /// `d^2 - |rij + vij t|^2`: positive inside a shell of diameter `d`.
    pub fn shell(&self, d: f64) -> Quadratic {
        let q = self.sphere(d);
        Quadratic::new(-q.a, -q.b, -q.c)
    }

    /// Velocities after an impulse along `normal` that sets the pair's
    /// normal relative speed to `vn_new`.
    pub fn kick_along(&self, normal: Vec3, vn_new: f64) -> (Vec3, Vec3) {
        let vn = normal.dot(self.vij());
        let dp = normal * (self.reduced_mass() * (vn_new - vn));
        (self.v1 + dp / self.m1, self.v2 - dp / self.m2)
    }

    /// Velocities after a radial impulse setting the radial speed to `vr_new`.
    pub fn kick_radial(&self, vr_new: f64) -> (Vec3, Vec3) {
        self.kick_along(self.rij.normalized(), vr_new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_data::ParticleState;

    #[test]
    fn test_minimum_image() {
        let b = Boundary::Periodic {
            size: Vec3::new(10.0, 10.0, 10.0),
        };
        let d = b.separation(Vec3::new(4.5, 0.0, 0.0), Vec3::new(-4.5, 0.0, 0.0));
        assert!((d.x + 1.0).abs() < 1e-12);
        assert_eq!(Boundary::Open.separation(Vec3::new(4.5, 0.0, 0.0), Vec3::ZERO).x, 4.5);
    }

    #[test]
    fn test_resting_particle_does_not_stream() {
        let mut p = Particle::new(0, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 0);
        p.state = ParticleState::Resting;
        stream_particle(&mut p, 2.0);
        assert_eq!(p.position, Vec3::ZERO);
        assert_eq!(effective_velocity(&p), Vec3::ZERO);
    }

    #[test]
    fn test_head_on_elastic_kick_swaps_velocities() {
        let pair = PairState {
            rij: Vec3::new(-1.0, 0.0, 0.0),
            v1: Vec3::new(1.0, 0.0, 0.0),
            v2: Vec3::new(-1.0, 0.0, 0.0),
            m1: 1.0,
            m2: 1.0,
        };
        let vr = pair.radial_velocity();
        assert!((vr + 2.0).abs() < 1e-12);
        let (v1, v2) = pair.kick_radial(-vr);
        assert!((v1.x + 1.0).abs() < 1e-12);
        assert!((v2.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_immovable_partner_reflects() {
        let pair = PairState {
            rij: Vec3::new(0.0, 1.0, 0.0),
            v1: Vec3::new(0.0, -2.0, 0.0),
            v2: Vec3::ZERO,
            m1: 1.0,
            m2: f64::INFINITY,
        };
        let (v1, v2) = pair.kick_radial(2.0);
        assert!((v1.y - 2.0).abs() < 1e-12);
        assert_eq!(v2, Vec3::ZERO);
    }
}
