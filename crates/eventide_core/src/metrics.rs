//! Run metrics and structured logging.
//!
//! Provides the tracing subscriber setup and the counters a kernel keeps
//! while it executes events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Metrics collector for one kernel.
pub struct Metrics {
    event_count: AtomicU64,
    particle_count: AtomicU64,
    print_interval: u64,
    pub counters: Mutex<HashMap<String, AtomicU64>>,
    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl Metrics {
    /// Creates a new metrics collector that logs every `print_interval` events.
    #[must_use]
    pub fn new(print_interval: u64) -> Self {
        Self {
            event_count: AtomicU64::new(0),
            particle_count: AtomicU64::new(0),
            print_interval: print_interval.max(1),
            counters: Mutex::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Records an executed event. Returns true when a progress line was due.
    pub fn record_event(&self, time: f64, particles: usize) -> bool {
        let count = self.event_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.particle_count
            .store(particles as u64, Ordering::Relaxed);

        if count % self.print_interval == 0 {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                count as f64 / elapsed
            } else {
                0.0
            };
            tracing::info!(
                event_count = count,
                time = time,
                particles = particles,
                events_per_sec = rate as u64,
                "Kernel progress"
            );
            return true;
        }
        false
    }

    /// Increments a named counter. The kernel keeps one per executed event type.
    pub fn increment_counter(&self, name: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Reads a named counter, zero if it was never incremented.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters
            .get(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn particle_count(&self) -> u64 {
        self.particle_count.load(Ordering::Relaxed)
    }

    /// Gets elapsed wall time since metrics creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Initialize tracing subscriber for logging.
pub fn init_logging() {
    init_logging_with(tracing::Level::INFO);
}

/// Initialize tracing at a chosen level. Later calls are ignored.
pub fn init_logging_with(level: tracing::Level) {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .finish(),
    )
    .ok();
}
