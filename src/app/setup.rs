//! Turns a [`RunConfig`] into ready-to-initialise simulations.

use anyhow::{Context, Result};
use eventide_core::config::{BoundaryKind, RunConfig};
use eventide_core::dynamics::Boundary;
use eventide_core::interaction::InteractionProvider;
use eventide_core::local::Wall;
use eventide_core::observer::{EventEffects, Misc, ReverseEventsCheck};
use eventide_core::packer::pack;
use eventide_core::systems::Andersen;
use eventide_core::{Simulation, SimulationBuilder, Snapshot};
use eventide_data::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Largest core diameter among the configured interactions.
pub fn max_core_distance(config: &RunConfig) -> f64 {
    config
        .system
        .interactions
        .iter()
        .map(|i| i.kind.core_distance())
        .fold(0.0, f64::max)
}

/// Everything except the particles: interactions, boundary, systems, plugins.
fn base_builder(config: &RunConfig, replica: u64, temperature: f64) -> SimulationBuilder {
    let size = Vec3::new(
        config.system.box_size,
        config.system.box_size,
        config.system.box_size,
    );
    let mut builder = Simulation::builder()
        .config(config.kernel.clone())
        .replica(replica)
        .temperature(temperature);

    for interaction in &config.system.interactions {
        builder = builder.interaction(interaction.clone());
    }

    builder = match config.system.boundary {
        BoundaryKind::Periodic => builder.boundary(Boundary::Periodic { size }),
        BoundaryKind::Walls => builder
            .boundary(Boundary::Open)
            .cell_region(size)
            .walls(Wall::box_walls(size, 0.5 * max_core_distance(config))),
        BoundaryKind::Open => builder.boundary(Boundary::Open),
    };

    if let Some(sleep) = &config.sleep {
        builder = builder.sleep(sleep.clone());
    }
    if let Some(thermostat) = &config.thermostat {
        builder = builder.thermostat(Andersen::new(thermostat.mean_free_time, temperature));
    }
    if let Some(period) = config.kernel.ticker_period {
        builder = builder.ticker(period);
    }

    builder
        .plugin(Box::new(Misc::new()))
        .plugin(Box::new(EventEffects::new()))
        .plugin(Box::new(ReverseEventsCheck::new()))
}

/// Packs a fresh configuration for `replica` at `temperature`.
///
/// Without an explicit temperature the packing temperature is used.
pub fn build_simulation(
    config: &RunConfig,
    replica: u64,
    temperature: Option<f64>,
) -> Result<Simulation> {
    let temperature = temperature.unwrap_or(config.packing.temperature);
    let size = Vec3::new(
        config.system.box_size,
        config.system.box_size,
        config.system.box_size,
    );
    let species = config
        .system
        .species
        .get(config.packing.species)
        .context("packing species out of range")?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.kernel.seed.wrapping_add(replica));
    rng.set_stream(1);
    let particles = pack(
        &mut rng,
        config.packing.particles,
        size,
        max_core_distance(config),
        config.packing.species,
        species.mass,
        temperature,
    )
    .with_context(|| format!("packing replica {replica}"))?;

    let mut builder = base_builder(config, replica, temperature);
    for s in &config.system.species {
        builder = builder.species(s.clone());
    }
    Ok(builder.particles(particles).build())
}

/// Rebuilds a simulation from a saved state under the current configuration.
pub fn restore_simulation(config: &RunConfig, snapshot: Snapshot, replica: u64) -> Simulation {
    let fingerprint = config.fingerprint();
    if let Some(saved) = &snapshot.fingerprint {
        if *saved != fingerprint {
            tracing::warn!(
                replica,
                saved = %saved,
                current = %fingerprint,
                "Snapshot was taken under a different configuration"
            );
        }
    }
    let temperature = snapshot.temperature.unwrap_or(config.packing.temperature);
    base_builder(config, replica, temperature)
        .restore(snapshot)
        .build()
}

/// `n` temperatures spaced geometrically from `min` to `max`.
pub fn geometric_ladder(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let ratio = (max / min).powf(1.0 / (n - 1) as f64);
            (0..n).map(|i| min * ratio.powi(i as i32)).collect()
        }
    }
}
