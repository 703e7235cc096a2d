//! The content pipeline: fetch, ranking, curation, image generation and
//! broadcast, run in that order on a fixed schedule. Stage correctness under
//! concurrency rests entirely on the store's compare-and-swap transition.

pub mod orchestrator;
pub mod parse;
pub mod prompts;
pub mod report;
pub mod scheduler;
pub mod sources;
pub mod stages;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Raised on ctrl-c. Executors check it between articles, so the article in
/// flight always finishes its transition before the process exits.
#[derive(Clone, Default)]
pub struct ShutdownFlag {
    raised: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is raised.
    pub async fn wait(&self) {
        loop {
            // register before checking, so a raise in between is not missed
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}
