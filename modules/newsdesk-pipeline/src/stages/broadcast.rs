use std::sync::Arc;

use chrono::Utc;
use newsdesk_common::{ArticlePatch, ArticleStatus, StoreError};
use newsdesk_store::{ArticleStore, SubscriberStore};
use telegram_client::{MessagePayload, Messenger};
use tracing::{debug, info, warn};

use crate::stages::StageMetrics;
use crate::ShutdownFlag;

pub const STAGE: &str = "broadcast";

/// Sends each freshly processed article to every active subscriber, then
/// marks it broadcast. Individual delivery failures are logged and dropped;
/// the article is never re-broadcast because of them, since that would
/// double-send to everyone who already got it.
pub struct BroadcastExecutor {
    store: Arc<dyn ArticleStore>,
    subscribers: Arc<dyn SubscriberStore>,
    messenger: Arc<dyn Messenger>,
    batch_size: usize,
}

impl BroadcastExecutor {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        subscribers: Arc<dyn SubscriberStore>,
        messenger: Arc<dyn Messenger>,
        batch_size: usize,
    ) -> Self {
        BroadcastExecutor {
            store,
            subscribers,
            messenger,
            batch_size,
        }
    }

    pub async fn run(&self, shutdown: &ShutdownFlag) -> anyhow::Result<StageMetrics> {
        let mut metrics = StageMetrics::default();
        let candidates = self.store.broadcast_candidates(self.batch_size).await?;
        if candidates.is_empty() {
            return Ok(metrics);
        }

        let audience = self.subscribers.active_subscribers().await?;

        for article in candidates {
            if shutdown.is_raised() {
                break;
            }
            metrics.attempt();
            let id = article.id;

            let payload = MessagePayload {
                title: article
                    .platforms
                    .as_ref()
                    .map(|p| p.website.headline.clone())
                    .unwrap_or_else(|| article.title.clone()),
                teaser: article
                    .platforms
                    .as_ref()
                    .map(|p| p.telegram.teaser.clone())
                    .unwrap_or_else(|| article.description.clone()),
                link: article.url.clone(),
                image_url: article.images.telegram.as_ref().map(|a| a.url.clone()),
            };

            let mut delivered = 0usize;
            for subscriber in &audience {
                match self.messenger.send(subscriber.chat_id, &payload).await {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        warn!(%id, chat_id = subscriber.chat_id, error = %e, "delivery failed");
                    }
                }
            }
            debug!(%id, delivered, audience = audience.len(), "send pass done");

            match self
                .store
                .transition(
                    id,
                    &[ArticleStatus::Processed],
                    ArticleStatus::Processed,
                    ArticlePatch {
                        broadcast_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(_) => {
                    info!(%id, delivered, "article broadcast");
                    metrics.succeed();
                }
                Err(StoreError::StaleTransition { .. }) => {
                    debug!(%id, "article moved during broadcast, not marking");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(%metrics, "broadcast pass complete");
        Ok(metrics)
    }
}
