mod common;

use common::{small_run_config, SimBuilder};
use eventide_core::config::BoundaryKind;
use eventide_core::interaction::{InteractionKind, ParallelCubes};
use eventide_core::{KernelError, RunLimits, SimStatus, StopReason};
use eventide_data::EventType;
use eventide_lib::app::build_simulation;

#[test]
fn test_head_on_pair_collides_once() {
    let mut sim = SimBuilder::new()
        .with_hard_spheres(1.0)
        .with_particle([-1.0, 0.0, 0.0], [1.0, 0.0, 0.0])
        .with_particle([1.0, 0.0, 0.0], [-1.0, 0.0, 0.0])
        .build();

    let reason = sim.run(None).unwrap();
    assert_eq!(reason, StopReason::Exhausted);
    assert_eq!(sim.event_count(), 1);
    assert_close!(sim.time(), 0.5, 1e-12);
    assert_close!(sim.particles()[0].velocity.x, -1.0, 1e-12);
    assert_close!(sim.particles()[1].velocity.x, 1.0, 1e-12);
    assert!(sim.next_event_time().is_infinite());
}

#[test]
fn test_square_well_capture_bounce_and_release() {
    let mut sim = SimBuilder::new()
        .with_square_well(1.0, 1.5, 1.0)
        .with_particle([-2.0, 0.0, 0.0], [1.0, 0.0, 0.0])
        .with_particle([2.0, 0.0, 0.0], [-1.0, 0.0, 0.0])
        .build();
    let energy = sim.total_energy();

    let mut types = Vec::new();
    while let Some(event) = sim.run_next_event().unwrap() {
        types.push(event.event_type);
        assert_energy_conserved!(sim, energy);
        if event.event_type == EventType::WellIn {
            assert_eq!(sim.ledger().len(), 1);
            assert_close!(sim.internal_energy(), -1.0, 1e-12);
        }
    }

    assert_eq!(
        types,
        vec![EventType::WellIn, EventType::Core, EventType::WellOut]
    );
    assert!(sim.ledger().is_empty());
    assert_close!(sim.kinetic_energy(), 1.0, 1e-9);

    let metrics = sim.metrics();
    assert_eq!(metrics.event_count(), 3);
    for name in ["WellIn", "Core", "WellOut"] {
        assert_eq!(metrics.counter(name), 1, "{name}");
    }
    assert_eq!(metrics.counter("Bounce"), 0);
}

#[test]
fn test_shallow_escape_bounces_inside_well() {
    // Relative kinetic energy 0.25 cannot climb a well of depth 1.
    let mut sim = SimBuilder::new()
        .with_square_well(1.0, 1.5, 1.0)
        .with_particle([-0.6, 0.0, 0.0], [-0.5, 0.0, 0.0])
        .with_particle([0.6, 0.0, 0.0], [0.5, 0.0, 0.0])
        .build();
    assert_eq!(sim.ledger().len(), 1);

    let event = sim.run_next_event().unwrap().unwrap();
    assert_eq!(event.event_type, EventType::Bounce);
    assert_eq!(sim.ledger().len(), 1);
    assert!(sim.particles()[0].velocity.x > 0.0);
}

#[test]
fn test_parallel_cubes_collide_face_on() {
    let mut sim = SimBuilder::new()
        .with_interaction(InteractionKind::ParallelCubes(ParallelCubes {
            width: 1.0,
            elasticity: 1.0,
        }))
        .with_particle([-2.0, 0.2, 0.0], [1.0, 0.0, 0.0])
        .with_particle([2.0, 0.0, 0.0], [-1.0, 0.0, 0.0])
        .build();

    let event = sim.run_next_event().unwrap().unwrap();
    assert_eq!(event.event_type, EventType::Core);
    assert_close!(sim.time(), 1.5, 1e-12);
    assert_close!(sim.particles()[0].velocity.x, -1.0, 1e-12);
    assert_close!(sim.particles()[0].velocity.y, 0.0, 1e-12);
}

#[test]
fn test_walls_keep_particles_inside() {
    let mut config = small_run_config(27, 6.0);
    config.system.boundary = BoundaryKind::Walls;
    let mut sim = build_simulation(&config, 0, None).unwrap();
    sim.initialise().unwrap();
    assert_eq!(sim.cell_dims(), Some([6, 6, 6]));
    let energy = sim.total_energy();

    sim.run_until(RunLimits::until(5.0), None).unwrap();
    assert_energy_conserved!(sim, energy);
    let limit = 0.5 * 6.0 - 0.5 + 1e-9;
    for p in sim.particles() {
        for k in 0..3 {
            assert!(p.position[k].abs() <= limit, "particle {} escaped", p.id);
        }
    }
    assert!(sim.event_count() > 0);
}

#[test]
fn test_periodic_gas_conserves_energy_and_momentum() {
    let config = small_run_config(64, 8.0);
    let mut sim = build_simulation(&config, 0, None).unwrap();
    sim.initialise().unwrap();
    let energy = sim.total_energy();

    let reason = sim.run_until(RunLimits::events(2000), None).unwrap();
    assert_eq!(reason, StopReason::EventLimit);
    assert_eq!(sim.event_count(), 2000);
    assert_energy_conserved!(sim, energy);
    let momentum = sim.momentum();
    assert!(momentum.nrm() < 1e-9, "momentum drifted to {:?}", momentum);
}

#[test]
fn test_run_until_suspends_and_resumes() {
    let config = small_run_config(27, 6.0);
    let mut sim = build_simulation(&config, 0, None).unwrap();
    sim.initialise().unwrap();

    assert_eq!(
        sim.run_until(RunLimits::until(1.0), None).unwrap(),
        StopReason::TimeReached
    );
    assert_close!(sim.time(), 1.0, 1e-12);
    let events = sim.event_count();
    sim.run_until(RunLimits::until(2.0), None).unwrap();
    assert_close!(sim.time(), 2.0, 1e-12);
    assert!(sim.event_count() >= events);
    assert_eq!(sim.status(), eventide_core::SimStatus::Suspended);
}

#[test]
fn test_event_outside_tolerance_window_is_reverse_event() {
    // A negative window turns every ordinary event into a reverse one.
    let mut sim = SimBuilder::new()
        .with_config(|c| c.reverse_tolerance = -1.0)
        .with_hard_spheres(1.0)
        .with_particle([-1.0, 0.0, 0.0], [1.0, 0.0, 0.0])
        .with_particle([1.0, 0.0, 0.0], [-1.0, 0.0, 0.0])
        .build();

    let err = sim.run_next_event().unwrap_err();
    match &err {
        KernelError::ReverseEvent {
            event_type,
            particle1,
            particle2,
            dt,
            time,
        } => {
            assert_eq!(*event_type, EventType::Core);
            let mut pair = [*particle1, particle2.unwrap()];
            pair.sort_unstable();
            assert_eq!(pair, [0, 1]);
            assert_close!(*dt, 0.5, 1e-12);
            assert_eq!(*time, 0.0);
        }
        other => panic!("unexpected error {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("reverse event Core"), "{message}");
    assert!(message.contains("at time 0"), "{message}");

    // The failed kernel refuses to go on and nothing moved.
    assert_eq!(sim.status(), SimStatus::Error);
    assert!(sim.run_next_event().is_err());
    assert_close!(sim.particles()[0].position.x, -1.0, 1e-12);
}
