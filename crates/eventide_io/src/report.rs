//! Run and replica-exchange reports, written as pretty JSON.

use crate::error::Result;
use crate::serialization::{read_json_file, write_json_file};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Current UTC time in RFC 3339 form.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Outcome of a single-kernel run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: String,
    pub fingerprint: String,
    pub status: String,
    pub stop_reason: String,
    pub time: f64,
    pub events: u64,
    pub kinetic_energy: f64,
    pub internal_energy: f64,
    pub captures: usize,
    pub resting: usize,
    #[serde(default)]
    pub plugins: Value,
}

/// Statistics of one temperature slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotReport {
    pub temperature: f64,
    /// Simulation currently sitting at this temperature.
    pub sim_id: usize,
    pub attempts: u64,
    pub swaps: u64,
    pub acceptance: f64,
    /// Fraction of visits by simulations last seen at the coldest slot.
    pub up_fraction: f64,
    pub time: f64,
    pub events: u64,
    pub kinetic_energy: f64,
    pub internal_energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplexReport {
    pub generated_at: String,
    pub fingerprint: String,
    pub mode: String,
    /// Why the report was produced: `complete`, `shutdown`, `peek` or `error`.
    pub status: String,
    pub slices: u64,
    pub replex_time: f64,
    pub elapsed_seconds: f64,
    pub round_trips: u64,
    /// Round trips completed by each simulation, indexed by simulation id.
    pub sim_round_trips: Vec<u64>,
    /// Coldest slot first.
    pub slots: Vec<SlotReport>,
}

impl RunReport {
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json_file(self, path)
    }
}

impl ReplexReport {
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json_file(self, path)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json_file(path)
    }

    /// Acceptance ratio over every slot.
    pub fn overall_acceptance(&self) -> f64 {
        let (swaps, attempts) = self
            .slots
            .iter()
            .fold((0, 0), |(s, a), slot| (s + slot.swaps, a + slot.attempts));
        if attempts == 0 {
            0.0
        } else {
            swaps as f64 / attempts as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(temperature: f64, swaps: u64, attempts: u64) -> SlotReport {
        SlotReport {
            temperature,
            sim_id: 0,
            attempts,
            swaps,
            acceptance: 0.0,
            up_fraction: 0.5,
            time: 1.0,
            events: 10,
            kinetic_energy: 1.5,
            internal_energy: 0.0,
        }
    }

    #[test]
    fn test_overall_acceptance() {
        let report = ReplexReport {
            generated_at: timestamp(),
            fingerprint: "f".into(),
            mode: "alternating_sequence".into(),
            status: "complete".into(),
            slices: 3,
            replex_time: 3.0,
            elapsed_seconds: 0.1,
            round_trips: 0,
            sim_round_trips: vec![0, 0],
            slots: vec![slot(1.0, 1, 4), slot(2.0, 3, 4)],
        };
        assert!((report.overall_acceptance() - 0.5).abs() < 1e-12);

        let path = std::env::temp_dir().join(format!("eventide_report_{}.json", std::process::id()));
        report.write(&path).unwrap();
        let restored = ReplexReport::read(&path).unwrap();
        assert_eq!(restored, report);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
