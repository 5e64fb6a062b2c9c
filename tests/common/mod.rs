pub mod macros;

use eventide_core::config::{BoundaryKind, KernelConfig, RunConfig};
use eventide_core::dynamics::Boundary;
use eventide_core::interaction::{HardSphere, Interaction, InteractionKind, SquareWell};
use eventide_core::range::{PairRange, ParticleRange};
use eventide_core::systems::SleepSystem;
use eventide_core::Simulation;
use eventide_data::{Particle, ParticleState, Species, Vec3};
use std::path::PathBuf;

#[allow(dead_code)]
pub struct SimBuilder {
    config: KernelConfig,
    species: Vec<Species>,
    interactions: Vec<Interaction>,
    particles: Vec<Particle>,
    boundary: Boundary,
    sleep: Option<SleepSystem>,
}

#[allow(dead_code)]
impl SimBuilder {
    pub fn new() -> Self {
        Self {
            config: KernelConfig {
                end_time: None,
                ..KernelConfig::default()
            },
            species: vec![Species::new("A", 1.0)],
            interactions: Vec::new(),
            particles: Vec::new(),
            boundary: Boundary::Open,
            sleep: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn with_config<F>(mut self, modifier: F) -> Self
    where
        F: FnOnce(&mut KernelConfig),
    {
        modifier(&mut self.config);
        self
    }

    pub fn with_interaction(mut self, kind: InteractionKind) -> Self {
        let name = format!("I{}", self.interactions.len());
        self.interactions
            .push(Interaction::new(name, PairRange::All, kind));
        self
    }

    pub fn with_hard_spheres(self, diameter: f64) -> Self {
        self.with_interaction(InteractionKind::HardSphere(HardSphere {
            diameter,
            elasticity: 1.0,
        }))
    }

    pub fn with_square_well(self, diameter: f64, lambda: f64, well_depth: f64) -> Self {
        self.with_interaction(InteractionKind::SquareWell(SquareWell {
            diameter,
            lambda,
            well_depth,
            elasticity: 1.0,
        }))
    }

    pub fn with_particle(mut self, position: [f64; 3], velocity: [f64; 3]) -> Self {
        let id = self.particles.len();
        self.particles.push(Particle::new(
            id,
            Vec3::new(position[0], position[1], position[2]),
            Vec3::new(velocity[0], velocity[1], velocity[2]),
            0,
        ));
        self
    }

    pub fn with_resting(mut self, position: [f64; 3]) -> Self {
        let id = self.particles.len();
        let mut p = Particle::new(
            id,
            Vec3::new(position[0], position[1], position[2]),
            Vec3::ZERO,
            0,
        );
        p.state = ParticleState::Resting;
        self.particles.push(p);
        self
    }

    pub fn with_periodic_box(mut self, size: f64) -> Self {
        self.boundary = Boundary::Periodic {
            size: Vec3::new(size, size, size),
        };
        self
    }

    pub fn with_sleep(mut self, range: ParticleRange, sleep_velocity: f64) -> Self {
        self.sleep = Some(SleepSystem::new("Sleep", range, sleep_velocity));
        self
    }

    /// Builds and initialises the simulation.
    pub fn build(self) -> Simulation {
        let mut builder = Simulation::builder()
            .config(self.config)
            .boundary(self.boundary)
            .particles(self.particles);
        for s in self.species {
            builder = builder.species(s);
        }
        for i in self.interactions {
            builder = builder.interaction(i);
        }
        if let Some(sleep) = self.sleep {
            builder = builder.sleep(sleep);
        }
        let mut sim = builder.build();
        sim.initialise().expect("test simulation should initialise");
        sim
    }
}

/// A small packed hard-sphere gas usable for full runs.
#[allow(dead_code)]
pub fn small_run_config(particles: usize, box_size: f64) -> RunConfig {
    let mut config = RunConfig::default();
    config.packing.particles = particles;
    config.system.box_size = box_size;
    config.system.boundary = BoundaryKind::Periodic;
    config.kernel.end_time = Some(2.0);
    config.kernel.seed = 11;
    config.replex.temperatures = vec![1.0, 1.5, 2.0];
    config.replex.slice_time = 0.5;
    config.replex.slices = Some(3);
    config.replex.threads = 2;
    config
}

/// A fresh per-test scratch directory under the system temp dir.
#[allow(dead_code)]
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("eventide-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}
