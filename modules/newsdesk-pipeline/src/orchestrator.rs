//! One tick = every stage once, in pipeline order. A stage falling over is
//! recorded and the next stage still runs; the pipeline's per-article state
//! lives in the store, so a faulted stage simply picks up where it left off
//! on the next tick.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use newsdesk_store::ArticleStore;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::report::{RunReport, StageReport};
use crate::stages::{broadcast, curation, fetch, image, ranking, StageMetrics};
use crate::ShutdownFlag;

pub struct Orchestrator {
    /// Absent when no headline source is configured; the pipeline then only
    /// works articles already in the store.
    fetch: Option<fetch::FetchExecutor>,
    ranking: ranking::RankingExecutor,
    curation: curation::CurationExecutor,
    image: image::ImageExecutor,
    broadcast: broadcast::BroadcastExecutor,
    store: Arc<dyn ArticleStore>,
    /// Run reports land here as JSON; None disables persistence.
    report_dir: Option<PathBuf>,
    runs: AtomicU64,
    faults: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        fetch: Option<fetch::FetchExecutor>,
        ranking: ranking::RankingExecutor,
        curation: curation::CurationExecutor,
        image: image::ImageExecutor,
        broadcast: broadcast::BroadcastExecutor,
        store: Arc<dyn ArticleStore>,
        report_dir: Option<PathBuf>,
    ) -> Self {
        Orchestrator {
            fetch,
            ranking,
            curation,
            image,
            broadcast,
            store,
            report_dir,
            runs: AtomicU64::new(0),
            faults: AtomicU64::new(0),
        }
    }

    pub async fn tick(&self, shutdown: &ShutdownFlag) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, "tick started");

        let mut stages = Vec::new();
        if let Some(fetch) = &self.fetch {
            stages.push(self.record(fetch::STAGE, fetch.run(shutdown).await));
        } else {
            debug!("no headline sources configured, fetch skipped");
        }
        stages.push(self.record(ranking::STAGE, self.ranking.run(shutdown).await));
        stages.push(self.record(curation::STAGE, self.curation.run(shutdown).await));
        stages.push(self.record(image::STAGE, self.image.run(shutdown).await));
        stages.push(self.record(broadcast::STAGE, self.broadcast.run(shutdown).await));

        let status_counts = match self.store.count_by_status().await {
            Ok(counts) => counts
                .into_iter()
                .map(|(s, n)| (s.as_str().to_string(), n))
                .collect(),
            Err(e) => {
                error!(error = %e, "status counts unavailable");
                BTreeMap::new()
            }
        };

        let report = RunReport {
            run_id,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            stages,
            status_counts,
        };

        self.runs.fetch_add(1, Ordering::Relaxed);
        if let Some(dir) = &self.report_dir {
            match report.save(dir) {
                Ok(path) => debug!(path = %path.display(), "run report written"),
                Err(e) => error!(error = %e, "run report not written"),
            }
        }
        info!(%run_id, "tick finished\n{report}");
        report
    }

    /// Run a single stage by name, for operator use.
    pub async fn run_stage(
        &self,
        name: &str,
        shutdown: &ShutdownFlag,
    ) -> anyhow::Result<StageReport> {
        let result = match name {
            fetch::STAGE => match &self.fetch {
                Some(fetch) => fetch.run(shutdown).await,
                None => anyhow::bail!("no headline sources configured"),
            },
            ranking::STAGE => self.ranking.run(shutdown).await,
            curation::STAGE => self.curation.run(shutdown).await,
            image::STAGE => self.image.run(shutdown).await,
            broadcast::STAGE => self.broadcast.run(shutdown).await,
            other => anyhow::bail!("unknown stage {other:?}"),
        };
        Ok(self.record(name, result))
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    fn record(&self, name: &str, result: anyhow::Result<StageMetrics>) -> StageReport {
        match result {
            Ok(metrics) => StageReport {
                name: name.to_string(),
                metrics,
                fault: None,
            },
            Err(e) => {
                error!(stage = name, error = %e, "stage faulted, continuing with next stage");
                self.faults.fetch_add(1, Ordering::Relaxed);
                StageReport {
                    name: name.to_string(),
                    metrics: StageMetrics::default(),
                    fault: Some(e.to_string()),
                }
            }
        }
    }
}
