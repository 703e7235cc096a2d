use std::sync::Arc;

use llm_client::{CompletionRequest, LanguageModel};
use newsdesk_common::{ArticlePatch, ArticleStatus, StoreError};
use newsdesk_store::ArticleStore;
use tracing::{debug, info, warn};

use crate::stages::StageMetrics;
use crate::{parse, prompts, ShutdownFlag};

pub const STAGE: &str = "ranking";

/// Selects the most newsworthy raw articles in one completion call. The rest
/// are filtered. An unparseable reply leaves the whole batch untouched for
/// the next tick; nothing gets filtered on a parse failure.
pub struct RankingExecutor {
    store: Arc<dyn ArticleStore>,
    llm: Arc<dyn LanguageModel>,
    enabled: bool,
    top_n: usize,
    batch_size: usize,
}

impl RankingExecutor {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        llm: Arc<dyn LanguageModel>,
        enabled: bool,
        top_n: usize,
        batch_size: usize,
    ) -> Self {
        RankingExecutor {
            store,
            llm,
            enabled,
            top_n: top_n.max(1),
            batch_size,
        }
    }

    pub async fn run(&self, shutdown: &ShutdownFlag) -> anyhow::Result<StageMetrics> {
        let mut metrics = StageMetrics::default();
        if !self.enabled {
            debug!("ranking disabled, curation takes raw articles directly");
            return Ok(metrics);
        }
        if shutdown.is_raised() {
            return Ok(metrics);
        }

        let candidates = self.store.ranking_candidates(self.batch_size).await?;
        if candidates.is_empty() {
            return Ok(metrics);
        }

        // a lone candidate needs no editor
        if candidates.len() == 1 {
            metrics.attempt();
            match self
                .store
                .transition(
                    candidates[0].id,
                    &[ArticleStatus::Raw],
                    ArticleStatus::Raw,
                    ArticlePatch::ranked(true),
                )
                .await
            {
                Ok(_) => metrics.succeed(),
                Err(StoreError::StaleTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(metrics);
        }

        let refs: Vec<_> = candidates.iter().collect();
        let request = CompletionRequest::new(prompts::EDITOR_SYSTEM, prompts::ranking(&refs, self.top_n))
            .max_tokens(200)
            .temperature(0.3);

        let reply = match self.llm.complete(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, count = candidates.len(), "ranking call failed, batch untouched");
                metrics.attempted = candidates.len() as u64;
                metrics.failed = metrics.attempted;
                return Ok(metrics);
            }
        };

        let picked = match parse::selection(&reply, candidates.len(), self.top_n) {
            Ok(picked) => picked,
            Err(e) => {
                warn!(error = %e, count = candidates.len(), "ranking reply unparseable, batch untouched");
                metrics.attempted = candidates.len() as u64;
                metrics.failed = metrics.attempted;
                return Ok(metrics);
            }
        };

        for (i, article) in candidates.iter().enumerate() {
            metrics.attempt();
            let (to, patch) = if picked.contains(&i) {
                (ArticleStatus::Raw, ArticlePatch::ranked(true))
            } else {
                (ArticleStatus::Filtered, ArticlePatch::default())
            };
            match self
                .store
                .transition(article.id, &[ArticleStatus::Raw], to, patch)
                .await
            {
                Ok(_) => metrics.succeed(),
                Err(StoreError::StaleTransition { .. }) => {
                    debug!(id = %article.id, "lost ranking race, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(%metrics, selected = picked.len(), "ranking pass complete");
        Ok(metrics)
    }
}
