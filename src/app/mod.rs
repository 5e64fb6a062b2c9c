pub mod runner;
pub mod setup;

pub use runner::{run_replex, run_single, RunOptions};
pub use setup::{build_simulation, geometric_ladder, restore_simulation};
