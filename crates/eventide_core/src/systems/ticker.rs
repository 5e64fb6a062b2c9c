//! Periodic sampling event in simulated time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub period: f64,
}

impl Ticker {
    pub fn new(period: f64) -> Self {
        Self { period }
    }

    /// Absolute time of the tick after `now`.
    pub fn next_after(&self, now: f64) -> f64 {
        if self.period > 0.0 {
            now + self.period
        } else {
            f64::INFINITY
        }
    }
}
