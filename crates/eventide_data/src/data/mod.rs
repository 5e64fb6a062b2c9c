//! Core data structures for the Eventide simulator.

pub mod event;
pub mod particle;
pub mod update;
pub mod vector;
