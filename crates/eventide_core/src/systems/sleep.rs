//! Sleep/wake: parks slow particles and wakes them when struck hard enough.
//!
//! The system watches every executed pair event. When it decides a particle
//! should change state it queues an action and asks for a zero-delay system
//! event; the actions run when that event fires.
//!
//! | pair                          | action                                            |
//! |-------------------------------|---------------------------------------------------|
//! | dynamic vs unmonitored rest   | dynamic sleeps if slow                            |
//! | dynamic vs monitored rest     | rest re-sleeps and hands its momentum back, or wakes |
//! |                               | (only a monitored striker may fall asleep)        |
//! | dynamic vs dynamic            | nothing                                           |

use crate::range::ParticleRange;
use eventide_data::{EventType, Particle, ParticleId, ParticleState, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pending state change for one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SleepAction {
    /// Force the velocity to zero (sleep or re-sleep).
    Zero,
    /// Add a momentum correction.
    Impulse(Vec3),
    /// Reactivate a resting particle with its current velocity.
    Wake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSystem {
    pub name: String,
    #[serde(default)]
    pub range: ParticleRange,
    pub sleep_velocity: f64,
    #[serde(skip)]
    pending: BTreeMap<ParticleId, SleepAction>,
}

impl SleepSystem {
    pub fn new(name: impl Into<String>, range: ParticleRange, sleep_velocity: f64) -> Self {
        Self {
            name: name.into(),
            range,
            sleep_velocity,
            pending: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn sleep_condition(&self, v: Vec3) -> bool {
        v.nrm() < self.sleep_velocity
    }

    pub fn monitors(&self, p: &Particle) -> bool {
        self.range.contains(p)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Reacts to a pair event that has just run. `m1`/`m2` are species masses.
    pub fn observe_pair(&mut self, p1: &Particle, m1: f64, p2: &Particle, m2: f64) {
        if !self.monitors(p1) && !self.monitors(p2) {
            return;
        }
        if p1.is_dynamic() && p2.is_dynamic() {
            return;
        }
        if !p1.is_dynamic() && !p2.is_dynamic() {
            // Rejected by the kernel before execution.
            return;
        }

        let ((dp, dm), (sp, sm)) = if p1.is_dynamic() {
            ((p1, m1), (p2, m2))
        } else {
            ((p2, m2), (p1, m1))
        };

        if !self.monitors(sp) {
            // Contact with an immovable collider.
            if self.sleep_condition(dp.velocity) {
                self.pending.insert(dp.id, SleepAction::Zero);
            }
            return;
        }

        // A monitored resting particle took the hit with its real mass: it
        // either re-sleeps and hands the momentum back, or wakes.
        if self.sleep_condition(sp.velocity * 0.1) {
            self.pending.insert(sp.id, SleepAction::Zero);
            let impulse = -sp.velocity * sm;
            if self.monitors(dp) && self.sleep_condition(dp.velocity + impulse / dm) {
                self.pending.insert(dp.id, SleepAction::Zero);
            } else {
                self.pending.insert(dp.id, SleepAction::Impulse(impulse));
            }
        } else {
            self.pending.insert(sp.id, SleepAction::Wake);
        }
    }

    /// Drains queued actions in particle order.
    pub fn take_pending(&mut self) -> Vec<(ParticleId, SleepAction)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Applies one action, returning the event type that describes it.
    pub fn apply(p: &mut Particle, action: SleepAction, mass: f64) -> EventType {
        match (action, p.state) {
            (SleepAction::Zero, ParticleState::Dynamic) => {
                p.state = ParticleState::Resting;
                p.velocity = Vec3::ZERO;
                EventType::Sleep
            }
            (SleepAction::Zero, ParticleState::Resting) => {
                p.velocity = Vec3::ZERO;
                EventType::Resleep
            }
            (SleepAction::Impulse(j), ParticleState::Dynamic) => {
                p.velocity += j / mass;
                EventType::Correct
            }
            (SleepAction::Wake, ParticleState::Dynamic) => EventType::Correct,
            (_, ParticleState::Resting) => {
                p.state = ParticleState::Dynamic;
                EventType::Wakeup
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn system() -> SleepSystem {
        SleepSystem::new("Sleeper", ParticleRange::Span { start: 0, end: 10 }, 0.1)
    }

    fn resting(id: usize, v: Vec3) -> Particle {
        let mut p = Particle::new(id, Vec3::ZERO, v, 0);
        p.state = ParticleState::Resting;
        p
    }

    #[test]
    fn test_slow_particle_on_fixed_collider_sleeps() {
        let mut s = system();
        let dp = Particle::new(1, Vec3::ZERO, Vec3::new(0.05, 0.0, 0.0), 0);
        let fc = resting(20, Vec3::ZERO);
        s.observe_pair(&dp, 1.0, &fc, 1.0);
        assert_eq!(s.take_pending(), vec![(1, SleepAction::Zero)]);
    }

    #[test]
    fn test_fast_particle_on_fixed_collider_stays_dynamic() {
        let mut s = system();
        let dp = Particle::new(1, Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0), 0);
        let fc = resting(20, Vec3::ZERO);
        s.observe_pair(&fc, 1.0, &dp, 1.0);
        assert!(!s.has_pending());
    }

    #[test]
    fn test_gentle_hit_resleeps_and_corrects() {
        let mut s = system();
        let dp = Particle::new(1, Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), 0);
        let sp = resting(2, Vec3::new(0.5, 0.0, 0.0));
        s.observe_pair(&dp, 1.0, &sp, 1.0);
        let pending = s.take_pending();
        assert_eq!(
            pending,
            vec![
                (1, SleepAction::Impulse(Vec3::new(-0.5, 0.0, 0.0))),
                (2, SleepAction::Zero),
            ]
        );
    }

    #[test]
    fn test_hard_hit_wakes() {
        let mut s = system();
        let dp = Particle::new(1, Vec3::ZERO, Vec3::new(0.0, 0.0, 0.0), 0);
        let sp = resting(2, Vec3::new(1.5, 0.0, 0.0));
        s.observe_pair(&dp, 1.0, &sp, 1.0);
        assert_eq!(s.take_pending(), vec![(2, SleepAction::Wake)]);

        let mut woken = sp.clone();
        assert_eq!(SleepSystem::apply(&mut woken, SleepAction::Wake, 1.0), EventType::Wakeup);
        assert!(woken.is_dynamic());
        assert_eq!(woken.velocity, Vec3::new(1.5, 0.0, 0.0));
    }

    #[test]
    fn test_unmonitored_striker_wakes_monitored_rest() {
        let mut s = system();
        let dp = Particle::new(30, Vec3::ZERO, Vec3::ZERO, 0);
        let sp = resting(2, Vec3::new(1.0, 0.0, 0.0));
        s.observe_pair(&dp, 1.0, &sp, 1.0);
        assert_eq!(s.take_pending(), vec![(2, SleepAction::Wake)]);
    }

    #[test]
    fn test_unmonitored_striker_takes_momentum_back_but_never_sleeps() {
        let mut s = system();
        let dp = Particle::new(30, Vec3::ZERO, Vec3::new(0.45, 0.0, 0.0), 0);
        let sp = resting(2, Vec3::new(0.5, 0.0, 0.0));
        s.observe_pair(&sp, 1.0, &dp, 1.0);
        assert_eq!(
            s.take_pending(),
            vec![
                (2, SleepAction::Zero),
                (30, SleepAction::Impulse(Vec3::new(-0.5, 0.0, 0.0))),
            ]
        );
    }

    #[test]
    fn test_unmonitored_pairs_are_ignored() {
        let mut s = system();
        let dp = Particle::new(30, Vec3::ZERO, Vec3::new(0.01, 0.0, 0.0), 0);
        let sp = resting(31, Vec3::ZERO);
        s.observe_pair(&dp, 1.0, &sp, 1.0);
        assert!(!s.has_pending());
    }

    #[test]
    fn test_sleep_and_correct_transitions() {
        let mut p = Particle::new(0, Vec3::ZERO, Vec3::new(0.3, 0.0, 0.0), 0);
        assert_eq!(
            SleepSystem::apply(&mut p, SleepAction::Impulse(Vec3::new(0.2, 0.0, 0.0)), 2.0),
            EventType::Correct
        );
        assert!((p.velocity.x - 0.4).abs() < 1e-12);
        assert_eq!(SleepSystem::apply(&mut p, SleepAction::Zero, 2.0), EventType::Sleep);
        assert_eq!(p.state, ParticleState::Resting);
        assert_eq!(p.velocity, Vec3::ZERO);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_resleep_is_idempotent(
            vx in -5.0f64..5.0, vy in -5.0f64..5.0, vz in -5.0f64..5.0,
            repeats in 1usize..10,
        ) {
            let mut p = resting(0, Vec3::new(vx, vy, vz));
            for _ in 0..repeats {
                let ty = SleepSystem::apply(&mut p, SleepAction::Zero, 1.0);
                prop_assert_eq!(ty, EventType::Resleep);
                prop_assert_eq!(p.velocity, Vec3::ZERO);
                prop_assert_eq!(p.state, ParticleState::Resting);
            }
        }
    }
}
