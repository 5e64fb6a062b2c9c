mod common;

use common::small_run_config;
use eventide_core::config::{RunConfig, SwapMode};
use eventide_core::Simulation;
use eventide_lib::app::build_simulation;
use eventide_lib::engine::{AlwaysAccept, ReplexEngine, ReplexOutcome, ShutdownManager};
use proptest::prelude::*;

fn ladder(config: &RunConfig) -> Vec<Simulation> {
    config
        .replex
        .temperatures
        .iter()
        .enumerate()
        .map(|(i, &t)| build_simulation(config, i as u64, Some(t)).unwrap())
        .collect()
}

fn engine(config: &RunConfig) -> ReplexEngine {
    ReplexEngine::new(
        ladder(config),
        &config.replex,
        config.kernel.seed,
        ShutdownManager::new(),
    )
    .unwrap()
}

#[test]
fn test_every_replica_reaches_the_slice_boundary() {
    let config = small_run_config(27, 6.0);
    let mut engine = engine(&config);
    assert_eq!(engine.run().unwrap(), ReplexOutcome::Complete);

    assert_eq!(engine.slices_done(), 3);
    for sim in engine.sims() {
        assert!((sim.time() - 1.5).abs() < 1e-9);
    }
    let per_replica: u64 = engine.sims().iter().map(|s| s.event_count()).sum();
    assert_eq!(engine.total_events(), per_replica);
    assert_eq!(
        engine.sim_round_trips().iter().sum::<u64>(),
        engine.round_trips()
    );
    assert!(engine.slots().iter().all(|s| s.attempts > 0));
}

#[test]
fn test_no_swapping_leaves_ladder_untouched() {
    let mut config = small_run_config(27, 6.0);
    config.replex.mode = SwapMode::NoSwapping;
    let mut engine = engine(&config);
    engine.run().unwrap();

    for (idx, slot) in engine.slots().iter().enumerate() {
        assert_eq!(slot.sim_id, idx);
        assert_eq!(slot.attempts, 0);
    }
    assert_eq!(engine.round_trips(), 0);
}

#[test]
fn test_swapped_replicas_follow_their_new_temperature() {
    let config = small_run_config(27, 6.0);
    let mut engine = engine(&config).with_rule(Box::new(AlwaysAccept));
    engine.run_slice().unwrap();
    engine.replex_swap(SwapMode::AlternatingSequence).unwrap();

    assert_eq!(engine.slots()[0].sim_id, 1);
    assert_eq!(engine.slots()[1].sim_id, 0);
    for slot in engine.slots() {
        let sim = &engine.sims()[slot.sim_id];
        assert_eq!(sim.temperature(), Some(slot.temperature));
    }

    engine.run_slice().unwrap();
    for sim in engine.sims() {
        assert!((sim.time() - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_shutdown_during_run_leaves_replicas_suspended() {
    let mut config = small_run_config(27, 6.0);
    config.replex.slices = None;
    config.replex.shutdown_check_interval = 10;
    let shutdown = ShutdownManager::new();
    let mut engine = ReplexEngine::new(
        ladder(&config),
        &config.replex,
        config.kernel.seed,
        shutdown.clone(),
    )
    .unwrap();

    let trigger = shutdown.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        trigger.request_shutdown();
    });
    let outcome = engine.run().unwrap();
    handle.join().unwrap();

    assert_eq!(outcome, ReplexOutcome::Shutdown);
    for sim in engine.sims() {
        assert_eq!(sim.status(), eventide_core::SimStatus::Suspended);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn test_swaps_conserve_particles_and_kinetic_energy(
        seed in any::<u64>(),
        i in 0usize..3,
        j in 0usize..3,
    ) {
        prop_assume!(i != j);
        let mut config = small_run_config(27, 6.0);
        config.kernel.seed = seed;
        let mut engine = engine(&config);
        let sum = |e: &ReplexEngine| -> (usize, f64) {
            let a = e.simulation_at(i).unwrap();
            let b = e.simulation_at(j).unwrap();
            (
                a.particles().len() + b.particles().len(),
                a.kinetic_energy() + b.kinetic_energy(),
            )
        };

        let (n_before, ke_before) = sum(&engine);
        let trips_before = engine.round_trips();
        let accepted = engine.attempt(i, j).unwrap();
        let (n_after, ke_after) = sum(&engine);

        prop_assert_eq!(n_before, n_after);
        prop_assert!((ke_before - ke_after).abs() < 1e-9);
        prop_assert_eq!(engine.round_trips(), trips_before);
        if accepted {
            prop_assert_eq!(engine.slots()[i].swaps, 1);
        }
    }
}
