//! Uniform neighbour cell grid over a periodic or walled box.
//!
//! Cells are at least as wide as the longest interaction distance, so any
//! pair that can interact sits in the same or an adjacent cell. Particles
//! change cell only through `Cell` events; their cell is never recomputed
//! from the position, which keeps membership stable under round-off.
//!
//! A bounded grid covers a walled box: edge cells have no outer face and
//! neighbour lookups stop at the box edge.

use crate::error::{KernelError, KernelResult};
use crate::roots::interval_exit;
use eventide_data::{Particle, ParticleId, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct CellGrid {
    size: Vec3,
    dims: [usize; 3],
    side: Vec3,
    cells: Vec<Vec<ParticleId>>,
    coords: Vec<[usize; 3]>,
    periodic: bool,
}

impl CellGrid {
    /// Creates an empty grid over a box of `size` with cells no narrower than `min_side`.
    pub fn new(size: Vec3, min_side: f64) -> KernelResult<Self> {
        if !(min_side > 0.0) || !size.is_finite() {
            return Err(KernelError::config(format!(
                "cell grid needs a positive cell width, got {min_side}"
            )));
        }
        let mut dims = [1usize; 3];
        let mut side = size;
        for k in 0..3 {
            if size[k] < min_side {
                return Err(KernelError::config(format!(
                    "box side {} is shorter than the interaction range {min_side}",
                    size[k]
                )));
            }
            dims[k] = ((size[k] / min_side).floor() as usize).max(1);
            side[k] = size[k] / dims[k] as f64;
        }
        Ok(Self {
            size,
            dims,
            side,
            cells: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
            coords: Vec::new(),
            periodic: true,
        })
    }

    /// Grid over a walled box of `size`; particles never wrap.
    pub fn bounded(size: Vec3, min_side: f64) -> KernelResult<Self> {
        Ok(Self {
            periodic: false,
            ..Self::new(size, min_side)?
        })
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    fn index(&self, c: [usize; 3]) -> usize {
        (c[2] * self.dims[1] + c[1]) * self.dims[0] + c[0]
    }

    fn coord_of(&self, pos: Vec3) -> [usize; 3] {
        let mut c = [0usize; 3];
        for k in 0..3 {
            let x = (pos[k] + 0.5 * self.size[k]) / self.side[k];
            c[k] = if x.is_finite() && x > 0.0 {
                (x.floor() as usize).min(self.dims[k] - 1)
            } else {
                0
            };
        }
        c
    }

    /// Places every particle into its cell. Periodic positions must already be wrapped.
    pub fn build(&mut self, particles: &[Particle]) {
        for cell in self.cells.iter_mut() {
            cell.clear();
        }
        self.coords = particles.iter().map(|p| self.coord_of(p.position)).collect();
        for p in particles {
            let idx = self.index(self.coords[p.id]);
            self.cells[idx].push(p.id);
        }
    }

    pub fn cell_of(&self, p: ParticleId) -> [usize; 3] {
        self.coords[p]
    }

    /// Particles in the 27 cells around `p`'s cell, excluding `p`.
    pub fn neighbours(&self, p: ParticleId, out: &mut Vec<ParticleId>) {
        out.clear();
        let c = self.coords[p];
        let mut seen: Vec<usize> = Vec::with_capacity(27);
        for dz in [-1i64, 0, 1] {
            for dy in [-1i64, 0, 1] {
                for dx in [-1i64, 0, 1] {
                    let (Some(x), Some(y), Some(z)) = (
                        self.step(c[0], dx, 0),
                        self.step(c[1], dy, 1),
                        self.step(c[2], dz, 2),
                    ) else {
                        continue;
                    };
                    let idx = self.index([x, y, z]);
                    if seen.contains(&idx) {
                        continue;
                    }
                    seen.push(idx);
                    out.extend(self.cells[idx].iter().copied().filter(|&q| q != p));
                }
            }
        }
    }

    /// Cell coordinate `d` steps from `c` along axis `k`, if the grid has one.
    fn step(&self, c: usize, d: i64, k: usize) -> Option<usize> {
        let n = self.dims[k] as i64;
        let next = c as i64 + d;
        if self.periodic {
            Some(next.rem_euclid(n) as usize)
        } else {
            (0..n).contains(&next).then_some(next as usize)
        }
    }

    fn bounds(&self, c: [usize; 3]) -> (Vec3, Vec3) {
        let mut lower = Vec3::ZERO;
        let mut upper = Vec3::ZERO;
        for k in 0..3 {
            lower[k] = -0.5 * self.size[k] + c[k] as f64 * self.side[k];
            upper[k] = lower[k] + self.side[k];
            if !self.periodic {
                if c[k] == 0 {
                    lower[k] = f64::NEG_INFINITY;
                }
                if c[k] + 1 == self.dims[k] {
                    upper[k] = f64::INFINITY;
                }
            }
        }
        (lower, upper)
    }

    fn exit(&self, p: &Particle) -> Option<(f64, usize)> {
        if !p.is_dynamic() {
            return None;
        }
        let (lower, upper) = self.bounds(self.coords[p.id]);
        let mut best: Option<(f64, usize)> = None;
        for k in 0..3 {
            let t = interval_exit(p.position[k], p.velocity[k], lower[k], upper[k]);
            if t.is_finite() && best.map_or(true, |(bt, _)| t < bt) {
                best = Some((t, k));
            }
        }
        best
    }

    /// Time until `p` leaves its cell.
    pub fn next_crossing(&self, p: &Particle) -> Option<f64> {
        self.exit(p).map(|(t, _)| t)
    }

    /// Moves `p` into the next cell along its exit face, wrapping its position
    /// when it leaves a periodic box. Returns false if `p` has no exit.
    pub fn cross(&mut self, p: &mut Particle) -> bool {
        let Some((_, k)) = self.exit(p) else {
            return false;
        };
        let old = self.coords[p.id];
        let forward = p.velocity[k] > 0.0;
        let Some(next) = self.step(old[k], if forward { 1 } else { -1 }, k) else {
            return false;
        };
        let mut new = old;
        new[k] = next;
        if self.periodic && forward && next == 0 {
            p.position[k] -= self.size[k];
        } else if self.periodic && !forward && next + 1 == self.dims[k] {
            p.position[k] += self.size[k];
        }


        let (from, to) = (self.index(old), self.index(new));
        if from != to {
            self.cells[from].retain(|&q| q != p.id);
            self.cells[to].push(p.id);
        }
        self.coords[p.id] = new;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> CellGrid {
        CellGrid::new(Vec3::new(10.0, 10.0, 10.0), 2.0).unwrap()
    }

    #[test]
    fn test_dims_from_range() {
        let g = CellGrid::new(Vec3::new(10.0, 7.0, 4.0), 2.0).unwrap();
        assert_eq!(g.dims(), [5, 3, 2]);
        assert!(CellGrid::new(Vec3::new(1.0, 10.0, 10.0), 2.0).is_err());
    }

    #[test]
    fn test_neighbours_wrap_around_the_box() {
        let mut g = grid();
        let particles = vec![
            Particle::new(0, Vec3::new(-4.9, 0.0, 0.0), Vec3::ZERO, 0),
            Particle::new(1, Vec3::new(4.9, 0.0, 0.0), Vec3::ZERO, 0),
            Particle::new(2, Vec3::new(0.0, 0.0, 0.0), Vec3::ZERO, 0),
        ];
        g.build(&particles);
        let mut out = Vec::new();
        g.neighbours(0, &mut out);
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn test_small_grid_does_not_duplicate() {
        let mut g = CellGrid::new(Vec3::new(4.0, 4.0, 4.0), 2.0).unwrap();
        let particles = vec![
            Particle::new(0, Vec3::new(-1.0, -1.0, -1.0), Vec3::ZERO, 0),
            Particle::new(1, Vec3::new(1.0, 1.0, 1.0), Vec3::ZERO, 0),
        ];
        g.build(&particles);
        let mut out = Vec::new();
        g.neighbours(0, &mut out);
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn test_crossing_wraps_position() {
        let mut g = grid();
        let mut p = Particle::new(0, Vec3::new(4.5, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0);
        g.build(std::slice::from_ref(&p));
        assert_eq!(g.cell_of(0), [4, 2, 2]);
        let t = g.next_crossing(&p).unwrap();
        assert!((t - 0.5).abs() < 1e-12);

        p.position.x += t;
        assert!(g.cross(&mut p));
        assert_eq!(g.cell_of(0), [0, 2, 2]);
        assert!((p.position.x + 5.0).abs() < 1e-12);
        assert!((g.next_crossing(&p).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_bounded_grid_stops_at_the_box_edge() {
        let mut g = CellGrid::bounded(Vec3::new(10.0, 10.0, 10.0), 2.0).unwrap();
        assert!(!g.is_periodic());
        let particles = vec![
            Particle::new(0, Vec3::new(-4.9, 0.0, 0.0), Vec3::ZERO, 0),
            Particle::new(1, Vec3::new(4.9, 0.0, 0.0), Vec3::ZERO, 0),
            Particle::new(2, Vec3::new(-3.5, 0.5, 0.0), Vec3::ZERO, 0),
        ];
        g.build(&particles);
        let mut out = Vec::new();
        g.neighbours(0, &mut out);
        assert_eq!(out, vec![2]);
    }

    #[test]
    fn test_bounded_edge_cell_has_no_outer_face() {
        let mut g = CellGrid::bounded(Vec3::new(10.0, 10.0, 10.0), 2.0).unwrap();
        let mut p = Particle::new(0, Vec3::new(4.5, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0);
        g.build(std::slice::from_ref(&p));
        assert_eq!(g.next_crossing(&p), None);
        assert!(!g.cross(&mut p));
        assert_eq!(g.cell_of(0), [4, 2, 2]);

        // Heading back inwards it still crosses the inner face.
        p.velocity = Vec3::new(-1.0, 0.0, 0.0);
        assert!((g.next_crossing(&p).unwrap() - 0.5).abs() < 1e-12);
        p.position.x -= 0.5;
        assert!(g.cross(&mut p));
        assert_eq!(g.cell_of(0), [3, 2, 2]);
        assert!((p.position.x - 4.0).abs() < 1e-12);
    }
}
