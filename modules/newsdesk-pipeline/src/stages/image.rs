use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use image_client::{ImageGenerator, ImageHost};
use llm_client::{CompletionRequest, LanguageModel};
use newsdesk_common::{
    backoff, AdapterError, Article, ArticlePatch, ArticleStatus, Destination, ImageAsset,
    StoreError,
};
use newsdesk_store::ArticleStore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::stages::StageMetrics;
use crate::{parse, prompts, ShutdownFlag};

pub const STAGE: &str = "image";

enum Failure {
    /// Transient trouble; bump the retry count and resume next tick.
    Retry(String),
    /// Park the article in `error`.
    Park(String),
}

/// Generates and hosts one image per destination. The curated-to-
/// generating_images claim is the lock: whoever wins it owns the article's
/// imagery, and nobody regenerates a destination that is already present.
pub struct ImageExecutor {
    store: Arc<dyn ArticleStore>,
    llm: Arc<dyn LanguageModel>,
    generator: Arc<dyn ImageGenerator>,
    host: Arc<dyn ImageHost>,
    models: Vec<String>,
    max_retries: u32,
    backoff_base: Duration,
    /// Articles touched more recently than this are assumed in flight in
    /// another process and are not resumed.
    resume_grace: Duration,
    batch_size: usize,
}

impl ImageExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ArticleStore>,
        llm: Arc<dyn LanguageModel>,
        generator: Arc<dyn ImageGenerator>,
        host: Arc<dyn ImageHost>,
        models: Vec<String>,
        max_retries: u32,
        backoff_base: Duration,
        resume_grace: Duration,
        batch_size: usize,
    ) -> Self {
        ImageExecutor {
            store,
            llm,
            generator,
            host,
            models,
            max_retries,
            backoff_base,
            resume_grace,
            batch_size,
        }
    }

    pub async fn run(&self, shutdown: &ShutdownFlag) -> anyhow::Result<StageMetrics> {
        let mut metrics = StageMetrics::default();
        let mut handled: HashSet<Uuid> = HashSet::new();

        // fresh entries first
        let curated = self
            .store
            .find_by_status(ArticleStatus::Curated, self.batch_size)
            .await?;
        for article in curated {
            if shutdown.is_raised() {
                break;
            }
            let claimed = match self
                .store
                .transition(
                    article.id,
                    &[ArticleStatus::Curated],
                    ArticleStatus::GeneratingImages,
                    ArticlePatch::default(),
                )
                .await
            {
                Ok(a) => a,
                Err(StoreError::StaleTransition { .. }) => {
                    debug!(id = %article.id, "image claim lost, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            handled.insert(claimed.id);
            self.process(claimed, &mut metrics, shutdown).await?;
        }

        // then articles an earlier tick left incomplete
        let resumable = self
            .store
            .image_resume_candidates(self.max_retries, self.resume_grace, self.batch_size)
            .await?;
        for article in resumable {
            if shutdown.is_raised() {
                break;
            }
            if handled.contains(&article.id) {
                continue;
            }
            self.process(article, &mut metrics, shutdown).await?;
        }

        info!(%metrics, "image pass complete");
        Ok(metrics)
    }

    async fn process(
        &self,
        article: Article,
        metrics: &mut StageMetrics,
        shutdown: &ShutdownFlag,
    ) -> anyhow::Result<()> {
        metrics.attempt();
        let id = article.id;

        let headline = match article.platforms.as_ref() {
            Some(p) => p.website.headline.clone(),
            None => {
                metrics.fail();
                return self.park(id, "generating_images without curated content").await;
            }
        };
        let summary = article
            .curated
            .as_ref()
            .map(|c| c.summary.clone())
            .unwrap_or_default();

        let prompt_map = self.destination_prompts(&headline, &summary).await;
        let mut images = article.images.clone();

        for dest in images.missing() {
            if shutdown.is_raised() {
                // stays generating_images with what it has; resumed next run
                return Ok(());
            }
            let prompt = prompt_map
                .get(&dest)
                .cloned()
                .unwrap_or_else(|| prompts::fallback_image_prompt(&headline, dest));

            match self.produce(id, dest, &prompt).await {
                Ok(asset) => {
                    match self
                        .store
                        .transition(
                            id,
                            &[ArticleStatus::GeneratingImages],
                            ArticleStatus::GeneratingImages,
                            ArticlePatch::image(dest, asset.clone()),
                        )
                        .await
                    {
                        Ok(_) => {
                            debug!(%id, dest = dest.as_str(), url = %asset.url, "image stored");
                            images.set(dest, asset);
                        }
                        Err(StoreError::StaleTransition { .. }) => {
                            debug!(%id, "article moved during image work, dropping");
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(Failure::Retry(reason)) => {
                    let count = article.image_retry_count + 1;
                    metrics.fail();
                    if count >= self.max_retries {
                        warn!(%id, %reason, count, "image retries exhausted");
                        return self
                            .transition_or_skip(
                                id,
                                ArticleStatus::Error,
                                ArticlePatch {
                                    image_retry_count: Some(count),
                                    error_stage: Some(STAGE.to_string()),
                                    error_reason: Some(reason),
                                    ..Default::default()
                                },
                            )
                            .await;
                    }
                    warn!(%id, %reason, count, "image attempt failed, will resume");
                    return self
                        .transition_or_skip(
                            id,
                            ArticleStatus::GeneratingImages,
                            ArticlePatch {
                                image_retry_count: Some(count),
                                ..Default::default()
                            },
                        )
                        .await;
                }
                Err(Failure::Park(reason)) => {
                    metrics.fail();
                    return self.park(id, &reason).await;
                }
            }
        }

        if images.is_complete() {
            match self
                .store
                .transition(
                    id,
                    &[ArticleStatus::GeneratingImages],
                    ArticleStatus::Processed,
                    ArticlePatch {
                        processed_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(_) => {
                    info!(%id, "all imagery present, article processed");
                    metrics.succeed();
                }
                Err(StoreError::StaleTransition { .. }) => {
                    debug!(%id, "article moved before completion, dropping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// One prompt per destination from a single completion call; any gap is
    /// covered by a constructed fallback prompt.
    async fn destination_prompts(
        &self,
        headline: &str,
        summary: &str,
    ) -> std::collections::HashMap<Destination, String> {
        let request =
            CompletionRequest::new(prompts::EDITOR_SYSTEM, prompts::image_prompts(headline, summary))
                .max_tokens(500)
                .temperature(0.7);
        match self.llm.complete(request).await {
            Ok(reply) => parse::image_prompts(&reply),
            Err(e) => {
                debug!(error = %e, "prompt completion failed, using fallbacks");
                Default::default()
            }
        }
    }

    /// Generate and host one destination's image, walking the model fallback
    /// chain with backoff between attempts.
    async fn produce(
        &self,
        id: Uuid,
        dest: Destination,
        prompt: &str,
    ) -> Result<ImageAsset, Failure> {
        let (width, height) = dest.dimensions();
        let mut last_error = String::new();

        for (attempt, model) in self.models.iter().enumerate() {
            let bytes = match self.generator.generate(prompt, width, height, model).await {
                Ok(bytes) => bytes,
                Err(AdapterError::Permanent(msg)) => return Err(Failure::Park(msg)),
                Err(AdapterError::RateLimited { retry_after }) => {
                    last_error = "rate limited".to_string();
                    let wait =
                        backoff::rate_limit_delay(retry_after, self.backoff_base, attempt as u32);
                    debug!(%id, model, wait_secs = wait.as_secs(), "image endpoint rate limited");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(AdapterError::Transient(msg)) => {
                    last_error = msg;
                    let wait = backoff::delay_jittered(self.backoff_base, attempt as u32);
                    debug!(%id, model, wait_secs = wait.as_secs(), "image generation failed, next model");
                    tokio::time::sleep(wait).await;
                    continue;
                }
            };

            let filename = format!("newsdesk-{id}-{}.jpg", dest.as_str());
            match self.host.upload(bytes, &filename).await {
                Ok(url) => {
                    return Ok(ImageAsset {
                        url,
                        prompt: prompt.to_string(),
                        width,
                        height,
                    })
                }
                Err(AdapterError::Permanent(msg)) => return Err(Failure::Park(msg)),
                Err(e) => {
                    last_error = e.to_string();
                    let wait = backoff::delay_jittered(self.backoff_base, attempt as u32);
                    tokio::time::sleep(wait).await;
                }
            }
        }

        Err(Failure::Retry(format!(
            "all image models failed for {}: {last_error}",
            dest.as_str()
        )))
    }

    async fn park(&self, id: Uuid, reason: &str) -> anyhow::Result<()> {
        warn!(%id, reason, "parking article in error");
        self.transition_or_skip(
            id,
            ArticleStatus::Error,
            ArticlePatch::error(STAGE, reason),
        )
        .await
    }

    async fn transition_or_skip(
        &self,
        id: Uuid,
        to: ArticleStatus,
        patch: ArticlePatch,
    ) -> anyhow::Result<()> {
        match self
            .store
            .transition(id, &[ArticleStatus::GeneratingImages], to, patch)
            .await
        {
            Ok(_) | Err(StoreError::StaleTransition { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
