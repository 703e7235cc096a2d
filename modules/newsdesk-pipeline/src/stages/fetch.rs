use std::sync::Arc;

use newsdesk_common::{NewArticle, StoreError};
use newsdesk_store::ArticleStore;
use tracing::{debug, info, warn};

use crate::sources::{select_diverse, NewsSource, TextExtractor};
use crate::stages::StageMetrics;
use crate::ShutdownFlag;

pub const STAGE: &str = "fetch";

/// Pulls top headlines per category from each source and stores the ones
/// with a usable body as `raw`.
pub struct FetchExecutor {
    store: Arc<dyn ArticleStore>,
    sources: Vec<Arc<dyn NewsSource>>,
    extractor: Arc<dyn TextExtractor>,
    categories: Vec<String>,
    per_category: usize,
}

impl FetchExecutor {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        sources: Vec<Arc<dyn NewsSource>>,
        extractor: Arc<dyn TextExtractor>,
        categories: Vec<String>,
        per_category: usize,
    ) -> Self {
        FetchExecutor {
            store,
            sources,
            extractor,
            categories,
            per_category,
        }
    }

    pub async fn run(&self, shutdown: &ShutdownFlag) -> anyhow::Result<StageMetrics> {
        let mut metrics = StageMetrics::default();
        let mut deduped = 0u64;

        for category in &self.categories {
            for source in &self.sources {
                if shutdown.is_raised() {
                    break;
                }
                let headlines = match source.top_headlines(category, self.per_category).await {
                    Ok(h) => h,
                    Err(e) => {
                        warn!(source = source.name(), category, error = %e, "headline fetch failed");
                        continue;
                    }
                };

                for headline in select_diverse(headlines, self.per_category) {
                    if shutdown.is_raised() {
                        break;
                    }
                    metrics.attempt();

                    let body = match self.extractor.extract_full_text(&headline.url).await {
                        Ok(Some(body)) => body,
                        Ok(None) => {
                            debug!(url = %headline.url, "no usable body, skipping");
                            metrics.fail();
                            continue;
                        }
                        Err(e) => {
                            debug!(url = %headline.url, error = %e, "body extraction failed");
                            metrics.fail();
                            continue;
                        }
                    };

                    let new = NewArticle {
                        url: headline.url,
                        title: headline.title,
                        description: headline.description,
                        source: headline.source_name,
                        api_source: source.name().to_string(),
                        content: body,
                    };
                    match self.store.insert(new).await {
                        Ok(article) => {
                            debug!(id = %article.id, title = %article.title, "article stored");
                            metrics.succeed();
                        }
                        Err(StoreError::DuplicateKey { url }) => {
                            debug!(%url, "already stored, skipping");
                            deduped += 1;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        info!(%metrics, deduped, "fetch pass complete");
        Ok(metrics)
    }
}
