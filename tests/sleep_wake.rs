mod common;

use common::SimBuilder;
use eventide_core::range::ParticleRange;
use eventide_core::systems::{SleepAction, SleepSystem};
use eventide_core::{RunLimits, StopReason};
use eventide_data::{EventKind, EventType, Particle, ParticleState, Vec3};
use proptest::prelude::*;

#[test]
fn test_slow_particle_falls_asleep_on_fixed_obstacle() {
    // Particle 1 is resting and unmonitored, so it acts as an immovable wall.
    let mut sim = SimBuilder::new()
        .with_hard_spheres(1.0)
        .with_sleep(ParticleRange::List { ids: vec![0] }, 0.1)
        .with_particle([-2.0, 0.0, 0.0], [0.05, 0.0, 0.0])
        .with_resting([0.0, 0.0, 0.0])
        .build();

    let core = sim.run_next_event().unwrap().unwrap();
    assert_eq!(core.event_type, EventType::Core);
    assert_close!(sim.time(), 20.0, 1e-9);
    assert_close!(sim.particles()[0].velocity.x, -0.05, 1e-12);

    let sleep = sim.run_next_event().unwrap().unwrap();
    assert_eq!(sleep.event_type, EventType::Sleep);
    assert_close!(sim.time(), 20.0, 1e-9);
    assert_eq!(sim.particles()[0].state, ParticleState::Resting);
    assert_eq!(sim.particles()[0].velocity, Vec3::ZERO);
    assert_eq!(sim.resting_count(), 2);

    // Two resting particles are never paired.
    assert_eq!(sim.run(None).unwrap(), StopReason::Exhausted);
    assert!(sim.next_event_time().is_infinite());
}

#[test]
fn test_fast_particle_bounces_off_fixed_obstacle() {
    let mut sim = SimBuilder::new()
        .with_hard_spheres(1.0)
        .with_sleep(ParticleRange::List { ids: vec![0] }, 0.1)
        .with_particle([-2.0, 0.0, 0.0], [1.0, 0.0, 0.0])
        .with_resting([0.0, 0.0, 0.0])
        .build();

    sim.run_until(RunLimits::until(3.0), None).unwrap();
    assert_eq!(sim.event_count(), 1);
    assert_eq!(sim.particles()[0].state, ParticleState::Dynamic);
    assert_close!(sim.particles()[0].velocity.x, -1.0, 1e-12);
    // The obstacle never moves.
    assert_eq!(sim.particles()[1].position, Vec3::ZERO);
}

#[test]
fn test_hard_hit_wakes_monitored_particle() {
    let mut sim = SimBuilder::new()
        .with_hard_spheres(1.0)
        .with_sleep(ParticleRange::All, 0.1)
        .with_particle([-2.0, 0.0, 0.0], [2.0, 0.0, 0.0])
        .with_resting([0.0, 0.0, 0.0])
        .build();
    let momentum = sim.momentum();

    let core = sim.run_next_event().unwrap().unwrap();
    assert_eq!(core.event_type, EventType::Core);
    let wake = sim.run_next_event().unwrap().unwrap();
    assert_eq!(wake.event_type, EventType::Sleep);
    assert_eq!(sim.particles()[1].state, ParticleState::Dynamic);
    assert_eq!(sim.resting_count(), 0);
    assert_close!(sim.momentum().x, momentum.x, 1e-12);

    sim.run_until(RunLimits::until(2.0), None).unwrap();
    assert_close!(sim.particles()[1].position.x, 3.0, 1e-9);
}

#[test]
fn test_unmonitored_striker_wakes_monitored_resting_particle() {
    // Only the resting particle is watched by the sleep system.
    let mut sim = SimBuilder::new()
        .with_hard_spheres(1.0)
        .with_sleep(ParticleRange::Span { start: 1, end: 2 }, 0.1)
        .with_particle([-2.0, 0.0, 0.0], [1.0, 0.0, 0.0])
        .with_resting([0.0, 0.0, 0.0])
        .build();

    let core = sim.run_next_event().unwrap().unwrap();
    assert_eq!(core.event_type, EventType::Core);
    let wake = sim.run_next_event().unwrap().unwrap();
    assert_eq!(wake.event_type, EventType::Sleep);
    assert_eq!(sim.particles()[1].state, ParticleState::Dynamic);

    sim.run_until(RunLimits::until(3.0), None).unwrap();
    assert_close!(sim.particles()[1].position.x, 2.0, 1e-9);
    assert_close!(sim.particles()[0].velocity.x, 0.0, 1e-12);
    assert_close!(sim.momentum().x, 1.0, 1e-12);
    assert_close!(sim.kinetic_energy(), 0.5, 1e-12);
}

#[test]
fn test_resting_particles_never_keep_a_velocity() {
    let mut sim = SimBuilder::new()
        .with_hard_spheres(1.0)
        .with_sleep(ParticleRange::Span { start: 1, end: 2 }, 0.1)
        .with_particle([-2.0, 0.0, 0.0], [0.5, 0.0, 0.0])
        .with_resting([0.0, 0.0, 0.0])
        .with_particle([0.0, 3.0, 0.0], [0.0, -0.3, 0.0])
        .build();

    let momentum = sim.momentum();
    let mut resleeps = 0;
    for _ in 0..20 {
        let Some(event) = sim.run_next_event().unwrap() else {
            break;
        };
        // Pair contacts are followed by a zero-delay sleep event that settles them.
        if event.kind == EventKind::Interaction {
            continue;
        }
        if event.event_type == EventType::Sleep {
            resleeps += 1;
        }
        for p in sim.particles() {
            if p.state == ParticleState::Resting {
                assert_eq!(p.velocity, Vec3::ZERO, "particle {} at t = {}", p.id, sim.time());
            }
        }
    }
    assert!(resleeps >= 2);
    // Gentle hits bounce the strikers straight back.
    assert_close!(sim.momentum().x, -momentum.x, 1e-12);
    assert_close!(sim.momentum().y, -momentum.y, 1e-12);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_resleep_is_idempotent(
        vx in -1.0f64..1.0,
        vy in -1.0f64..1.0,
        repeats in 1usize..5,
    ) {
        let mut p = Particle::new(0, Vec3::ZERO, Vec3::new(vx, vy, 0.0), 0);
        p.state = ParticleState::Resting;
        for _ in 0..repeats {
            let event_type = SleepSystem::apply(&mut p, SleepAction::Zero, 1.0);
            prop_assert_eq!(event_type, EventType::Resleep);
            prop_assert_eq!(p.velocity, Vec3::ZERO);
            prop_assert_eq!(p.state, ParticleState::Resting);
        }
    }
}
