//! # Eventide IO
//!
//! I/O and persistence layer for the Eventide simulator.
//!
//! This crate provides:
//! - Structured error handling with custom error types
//! - JSON serialization helpers
//! - Gzip-compressed snapshot persistence
//! - Run and replica-exchange reports

/// Error types and result aliases for I/O operations
pub mod error;
/// Snapshot save and load, gzip-compressed JSON
pub mod persistence;
/// Run and replica-exchange report documents
pub mod report;
/// Validated serialization helpers for JSON
pub mod serialization;

pub use error::{IoError, Result};
pub use persistence::{load_snapshot, save_replicas, save_snapshot};
pub use report::{timestamp, ReplexReport, RunReport, SlotReport};
pub use serialization::{from_json, read_json_file, to_json, to_json_pretty, write_json_file};
