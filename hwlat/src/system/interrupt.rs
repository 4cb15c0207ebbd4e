//! Cooperative interruption.
//!
//! The signal handler only bumps a counter. Loops record the generation they
//! started in and check it at every iteration boundary, so a second Ctrl-C can
//! abort a teardown loop that the first Ctrl-C started.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    count: Arc<AtomicU64>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT/SIGTERM to this flag. May only be called once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let count = Arc::clone(&self.count);
        ctrlc::set_handler(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn trigger(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn generation(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.generation() > 0
    }

    /// True once a signal arrived after `generation` was taken.
    pub fn fired_since(&self, generation: u64) -> bool {
        self.generation() > generation
    }
}
