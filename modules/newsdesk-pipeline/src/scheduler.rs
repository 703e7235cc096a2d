//! Fixed-interval tick loop with graceful shutdown. No article is left
//! mid-transition: the flag is only checked between articles, and the loop
//! waits for the in-flight tick to finish before returning.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::orchestrator::Orchestrator;
use crate::ShutdownFlag;

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration, run_on_start: bool) -> Self {
        Scheduler {
            orchestrator,
            interval,
            run_on_start,
        }
    }

    pub async fn run(&self, shutdown: &ShutdownFlag) {
        info!(
            interval_secs = self.interval.as_secs(),
            run_on_start = self.run_on_start,
            "scheduler started"
        );

        if self.run_on_start && !shutdown.is_raised() {
            self.orchestrator.tick(shutdown).await;
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.wait() => {
                    info!(runs = self.orchestrator.runs(), "shutdown requested, scheduler stopping");
                    return;
                }
            }
            if shutdown.is_raised() {
                return;
            }
            self.orchestrator.tick(shutdown).await;
        }
    }
}

/// Raises the flag on the first ctrl-c.
pub fn listen_for_shutdown(shutdown: ShutdownFlag) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received, finishing the article in flight");
                shutdown.raise();
            }
            Err(e) => error!(error = %e, "signal listener failed"),
        }
    });
}
