use std::sync::Arc;
use std::time::Duration;

use llm_client::{CompletionRequest, LanguageModel};
use newsdesk_common::{
    AdapterError, Article, ArticlePatch, ArticleStatus, CuratedContent, InstagramContent,
    PlatformContent, StoreError, TelegramContent,
};
use newsdesk_store::ArticleStore;
use tracing::{debug, info, warn};

use crate::stages::StageMetrics;
use crate::{parse, prompts, ShutdownFlag};

pub const STAGE: &str = "curation";

/// Why one article's curation did not finish this tick.
enum Failure {
    /// Worth another try next tick; the article stays raw and nothing has
    /// been committed, so the retry starts clean.
    Retry(String),
    /// The model or its reply rejected this article for good. Parked in
    /// `error` for an operator.
    Park(String),
}

impl From<AdapterError> for Failure {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Permanent(msg) => Failure::Park(msg),
            other => Failure::Retry(other.to_string()),
        }
    }
}

/// Runs the fixed completion sequence per claimed article and commits the
/// result in a single raw-to-curated transition.
pub struct CurationExecutor {
    store: Arc<dyn ArticleStore>,
    llm: Arc<dyn LanguageModel>,
    require_ranked: bool,
    max_content_chars: usize,
    call_delay: Duration,
    batch_size: usize,
}

impl CurationExecutor {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        llm: Arc<dyn LanguageModel>,
        require_ranked: bool,
        max_content_chars: usize,
        call_delay: Duration,
        batch_size: usize,
    ) -> Self {
        CurationExecutor {
            store,
            llm,
            require_ranked,
            max_content_chars,
            call_delay,
            batch_size,
        }
    }

    pub async fn run(&self, shutdown: &ShutdownFlag) -> anyhow::Result<StageMetrics> {
        let mut metrics = StageMetrics::default();
        let candidates = self
            .store
            .curation_candidates(self.require_ranked, self.batch_size)
            .await?;

        for article in candidates {
            if shutdown.is_raised() {
                break;
            }
            metrics.attempt();
            let id = article.id;

            match self.curate_one(&article).await {
                Ok((curated, platforms)) => {
                    match self
                        .store
                        .transition(
                            id,
                            &[ArticleStatus::Raw],
                            ArticleStatus::Curated,
                            ArticlePatch::curated(curated, platforms),
                        )
                        .await
                    {
                        Ok(_) => {
                            info!(%id, title = %article.title, "article curated");
                            metrics.succeed();
                        }
                        Err(StoreError::StaleTransition { .. }) => {
                            debug!(%id, "claimed elsewhere during curation, dropping result");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(Failure::Retry(reason)) => {
                    warn!(%id, %reason, "curation deferred, article stays raw");
                    metrics.fail();
                }
                Err(Failure::Park(reason)) => {
                    warn!(%id, %reason, "curation failed permanently");
                    metrics.fail();
                    match self
                        .store
                        .transition(
                            id,
                            &[ArticleStatus::Raw],
                            ArticleStatus::Error,
                            ArticlePatch::error(STAGE, reason),
                        )
                        .await
                    {
                        Ok(_) | Err(StoreError::StaleTransition { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        info!(%metrics, "curation pass complete");
        Ok(metrics)
    }

    async fn curate_one(
        &self,
        article: &Article,
    ) -> Result<(CuratedContent, PlatformContent), Failure> {
        let content = truncate_chars(&article.content, self.max_content_chars);
        let title = &article.title;

        let reply = self
            .complete(prompts::summarize_and_rewrite(title, content), 2048, 0.7)
            .await?;
        let (summary, rewritten) =
            parse::summary_rewrite(&reply).map_err(|e| Failure::Park(e.to_string()))?;

        let reply = self.complete(prompts::extract_entities(content), 200, 0.3).await?;
        let entities = parse::entities(&reply).map_err(|e| Failure::Park(e.to_string()))?;

        let reply = self.complete(prompts::hashtags(title, &summary), 200, 0.7).await?;
        let hashtags = parse::hashtags(&reply).map_err(|e| Failure::Park(e.to_string()))?;

        let reply = self.complete(prompts::website(title, &rewritten), 2048, 0.7).await?;
        let website = parse::website(&reply).map_err(|e| Failure::Park(e.to_string()))?;

        let reply = self
            .complete(prompts::telegram_teaser(title, &summary), 200, 0.7)
            .await?;
        let teaser = parse::plain_text(&reply).map_err(|e| Failure::Park(e.to_string()))?;

        let reply = self
            .complete(prompts::instagram_caption(title, &summary), 500, 0.7)
            .await?;
        let caption = parse::plain_text(&reply).map_err(|e| Failure::Park(e.to_string()))?;

        let curated = CuratedContent {
            summary,
            rewritten_content: rewritten,
            entities,
            hashtags: hashtags.clone(),
        };
        let platforms = PlatformContent {
            website,
            telegram: TelegramContent { teaser },
            instagram: InstagramContent {
                caption,
                hashtags,
            },
        };
        Ok((curated, platforms))
    }

    async fn complete(
        &self,
        prompt: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, Failure> {
        // spacing between calls keeps per-minute quotas happy
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        let request = CompletionRequest::new(prompts::EDITOR_SYSTEM, prompt)
            .max_tokens(max_tokens)
            .temperature(temperature);
        Ok(self.llm.complete(request).await?)
    }
}

/// Char-boundary-safe prefix.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::truncate_chars;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
