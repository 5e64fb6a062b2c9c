//! Cooperative stop requests shared between the driver and the kernels.
//!
//! Kernels poll the flag between events, so a stop never lands in the middle
//! of an event and every replica halts in a consistent, resumable state. A
//! second Ctrl-C aborts the process without waiting.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Exit status used when a second interrupt aborts the run.
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone)]
pub struct ShutdownManager {
    stop: Arc<AtomicBool>,
    interrupts: Arc<AtomicUsize>,
    save_on_exit: bool,
    exit_code: i32,
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            interrupts: Arc::new(AtomicUsize::new(0)),
            save_on_exit: true,
            exit_code: 0,
        }
    }

    /// Hooks Ctrl-C. The first press stops at the next poll; the second exits.
    pub fn install_signal_handler(&self) -> Result<()> {
        let stop = Arc::clone(&self.stop);
        let interrupts = Arc::clone(&self.interrupts);
        ctrlc::set_handler(move || {
            if interrupts.fetch_add(1, Ordering::SeqCst) == 0 {
                stop.store(true, Ordering::SeqCst);
                tracing::warn!("Interrupt received, replicas stop at their next poll");
            } else {
                tracing::error!("Second interrupt, aborting without saving");
                std::process::exit(FORCED_EXIT_CODE);
            }
        })?;
        Ok(())
    }

    pub fn request_shutdown(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            tracing::info!("Stop requested");
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Handle polled by `Simulation::run_until` and the replica workers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Number of Ctrl-C presses seen so far.
    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    /// Whether a stopped run still writes its snapshot or replicas.
    pub fn set_save_on_exit(&mut self, save: bool) {
        self.save_on_exit = save;
    }

    pub fn should_save_on_exit(&self) -> bool {
        self.save_on_exit
    }

    pub fn set_exit_code(&mut self, code: i32) {
        self.exit_code = code;
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}
