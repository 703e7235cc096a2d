//! Stage executors. Each claims its own slice of the store, talks to its
//! adapters, and reports `StageMetrics`; no stage ever lets an adapter error
//! escape to the orchestrator.

pub mod broadcast;
pub mod curation;
pub mod fetch;
pub mod image;
pub mod ranking;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-stage outcome of one tick. `attempted` counts claimed articles;
/// duplicates seen by fetch are counted as neither success nor failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl StageMetrics {
    pub fn attempt(&mut self) {
        self.attempted += 1;
    }

    pub fn succeed(&mut self) {
        self.succeeded += 1;
    }

    pub fn fail(&mut self) {
        self.failed += 1;
    }
}

impl fmt::Display for StageMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempted, {} succeeded, {} failed",
            self.attempted, self.succeeded, self.failed
        )
    }
}
