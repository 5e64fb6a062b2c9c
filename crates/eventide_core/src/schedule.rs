//! Event schedule with deterministic ordering and lazy invalidation.
//!
//! Every particle owns a small heap of pending events predicted the last
//! time it was recomputed. A global ordered index holds exactly one key per
//! particle (the head of its heap) plus one per system with a pending event.
//!
//! Invalidation is lazy: [`Schedule::invalidate`] bumps the particle's
//! validity stamp. Any pending event that recorded the old stamp, whether it
//! sits in the particle's own heap or in a partner's, is stale and gets
//! discarded when it reaches the front. Nothing is rebuilt eagerly.
//!
//! Events are ordered by:
//! 1. Absolute time (earlier first)
//! 2. Sequence number (insertion order for identical times)

use eventide_data::{Event, ParticleId};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

/// Owner of a schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    Particle(ParticleId),
    System(usize),
}

/// Key for ordering events in the schedule.
#[derive(Debug, Clone, Copy)]
pub struct EventKey {
    /// Absolute simulation time of the event.
    pub time: f64,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
    pub slot: Slot,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.total_cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.sequence.cmp(&other.sequence) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.slot.cmp(&other.slot)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

/// An event waiting in a particle's heap.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub key: EventKey,
    pub event: Event,
    pub owner_stamp: u64,
    pub partner_stamp: Option<u64>,
    /// Capture state the pair prediction was made with.
    pub captured: bool,
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PendingEvent {}

/// The earliest valid event in the schedule.
#[derive(Debug, Clone)]
pub struct Scheduled {
    pub time: f64,
    pub event: Event,
    pub slot: Slot,
    /// Recorded capture state; `None` for system events.
    pub captured: Option<bool>,
}

#[derive(Debug, Default)]
pub struct Schedule {
    lists: Vec<BinaryHeap<Reverse<PendingEvent>>>,
    stamps: Vec<u64>,
    heads: Vec<Option<EventKey>>,
    systems: Vec<Option<(EventKey, Event)>>,
    index: BTreeSet<EventKey>,
    sequence: u64,
}

impl Schedule {
    pub fn new(particles: usize, systems: usize) -> Self {
        Self {
            lists: (0..particles).map(|_| BinaryHeap::new()).collect(),
            stamps: vec![0; particles],
            heads: vec![None; particles],
            systems: vec![None; systems],
            index: BTreeSet::new(),
            sequence: 0,
        }
    }

    /// Drops every pending event, keeping the stamps monotonic.
    pub fn clear(&mut self) {
        for (p, list) in self.lists.iter_mut().enumerate() {
            list.clear();
            self.stamps[p] += 1;
            self.heads[p] = None;
        }
        for sys in self.systems.iter_mut() {
            *sys = None;
        }
        self.index.clear();
    }

    pub fn particle_count(&self) -> usize {
        self.lists.len()
    }

    pub fn stamp(&self, p: ParticleId) -> u64 {
        self.stamps[p]
    }

    /// Number of pending entries, stale ones included.
    pub fn pending(&self) -> usize {
        self.lists.iter().map(BinaryHeap::len).sum::<usize>()
            + self.systems.iter().filter(|s| s.is_some()).count()
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Marks `p`'s predictions, and every prediction naming `p` as partner, stale.
    pub fn invalidate(&mut self, p: ParticleId) {
        self.stamps[p] += 1;
    }

    /// Empties `p`'s own heap ahead of a recompute.
    pub fn clear_particle(&mut self, p: ParticleId) {
        self.lists[p].clear();
        if let Some(old) = self.heads[p].take() {
            self.index.remove(&old);
        }
    }

    /// Adds an event to `owner`'s heap at absolute `time`.
    pub fn push(&mut self, owner: ParticleId, time: f64, event: Event, captured: bool) {
        let key = EventKey {
            time,
            sequence: self.next_sequence(),
            slot: Slot::Particle(owner),
        };
        let partner = match event.particle2 {
            Some(q) if q == owner => Some(event.particle1),
            other => other,
        };
        let pending = PendingEvent {
            key,
            event,
            owner_stamp: self.stamps[owner],
            partner_stamp: partner.map(|q| self.stamps[q]),
            captured,
        };
        self.lists[owner].push(Reverse(pending));
        self.refresh_head(owner);
    }

    /// Sets (or replaces) the pending event of system `idx`.
    pub fn set_system(&mut self, idx: usize, time: f64, event: Event) {
        self.clear_system(idx);
        let key = EventKey {
            time,
            sequence: self.next_sequence(),
            slot: Slot::System(idx),
        };
        self.index.insert(key);
        self.systems[idx] = Some((key, event));
    }

    pub fn clear_system(&mut self, idx: usize) {
        if let Some((key, _)) = self.systems[idx].take() {
            self.index.remove(&key);
        }
    }

    fn refresh_head(&mut self, p: ParticleId) {
        let top = self.lists[p].peek().map(|Reverse(e)| e.key);
        if top == self.heads[p] {
            return;
        }
        if let Some(old) = self.heads[p].take() {
            self.index.remove(&old);
        }
        if let Some(key) = top {
            self.index.insert(key);
            self.heads[p] = Some(key);
        }
    }

    fn is_valid(&self, e: &PendingEvent) -> bool {
        let owner = match e.key.slot {
            Slot::Particle(p) => p,
            Slot::System(_) => return true,
        };
        if e.owner_stamp != self.stamps[owner] {
            return false;
        }
        let partner = match e.event.particle2 {
            Some(q) if q == owner => Some(e.event.particle1),
            other => other,
        };
        match (partner, e.partner_stamp) {
            (Some(q), Some(stamp)) => self.stamps[q] == stamp,
            _ => true,
        }
    }

    /// Earliest valid event, discarding stale heads on the way.
    pub fn peek(&mut self) -> Option<Scheduled> {
        loop {
            let key = *self.index.first()?;
            match key.slot {
                Slot::System(idx) => {
                    let (_, event) = self.systems[idx]?;
                    return Some(Scheduled {
                        time: key.time,
                        event,
                        slot: key.slot,
                        captured: None,
                    });
                }
                Slot::Particle(p) => {
                    let valid = match self.lists[p].peek() {
                        Some(Reverse(e)) => self.is_valid(e),
                        None => {
                            self.index.remove(&key);
                            self.heads[p] = None;
                            continue;
                        }
                    };
                    if valid {
                        let Reverse(e) = self.lists[p].peek()?;
                        return Some(Scheduled {
                            time: e.key.time,
                            event: e.event,
                            slot: key.slot,
                            captured: Some(e.captured),
                        });
                    }
                    self.lists[p].pop();
                    self.refresh_head(p);
                }
            }
        }
    }

    /// Removes and returns the earliest valid event.
    pub fn pop(&mut self) -> Option<Scheduled> {
        let next = self.peek()?;
        match next.slot {
            Slot::System(idx) => self.clear_system(idx),
            Slot::Particle(p) => {
                self.lists[p].pop();
                self.refresh_head(p);
            }
        }
        Some(next)
    }

    /// Earliest valid event time, `f64::INFINITY` if nothing is pending.
    pub fn next_time(&mut self) -> f64 {
        self.peek().map_or(f64::INFINITY, |s| s.time)
    }
}
