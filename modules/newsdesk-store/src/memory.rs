use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use newsdesk_common::{Article, ArticlePatch, ArticleStatus, NewArticle, StoreError, Subscriber};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{validate_requeue, validate_transition, ArticleStore, SubscriberStore};

#[derive(Default)]
struct Inner {
    articles: HashMap<Uuid, Article>,
    by_url: HashMap<String, Uuid>,
    subscribers: HashMap<i64, Subscriber>,
}

/// In-memory backend. All operations take the single lock, so the
/// compare-and-swap in `transition` is atomic by construction.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_patch(article: &mut Article, patch: ArticlePatch) {
    if let Some(ranked) = patch.ranked {
        article.ranked = ranked;
    }
    if let Some(curated) = patch.curated {
        article.curated = Some(curated);
    }
    if let Some(platforms) = patch.platforms {
        article.platforms = Some(platforms);
    }
    if let Some((dest, asset)) = patch.image {
        article.images.set(dest, asset);
    }
    if let Some(count) = patch.image_retry_count {
        article.image_retry_count = count;
    }
    if let Some(at) = patch.processed_at {
        article.processed_at = Some(at);
    }
    if let Some(at) = patch.broadcast_at {
        article.broadcast = true;
        article.broadcast_at = Some(at);
    }
    if let Some(stage) = patch.error_stage {
        article.error_stage = Some(stage);
    }
    if let Some(reason) = patch.error_reason {
        article.error_reason = Some(reason);
    }
    article.updated_at = Utc::now();
}

fn sorted_matching<'a>(
    inner: &'a Inner,
    limit: usize,
    predicate: impl Fn(&Article) -> bool,
) -> Vec<Article> {
    let mut matched: Vec<&'a Article> =
        inner.articles.values().filter(|a| predicate(a)).collect();
    // id tiebreak keeps the order stable when timestamps collide
    matched.sort_by_key(|a| (a.created_at, a.id));
    matched.into_iter().take(limit).cloned().collect()
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn insert(&self, new: NewArticle) -> Result<Article, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.by_url.contains_key(&new.url) {
            return Err(StoreError::DuplicateKey { url: new.url });
        }
        let article = Article::from_new(new);
        inner.by_url.insert(article.url.clone(), article.id);
        inner.articles.insert(article.id, article.clone());
        Ok(article)
    }

    async fn get(&self, id: Uuid) -> Result<Article, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .articles
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn find_by_status(
        &self,
        status: ArticleStatus,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(sorted_matching(&inner, limit, |a| a.status == status))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[ArticleStatus],
        to: ArticleStatus,
        patch: ArticlePatch,
    ) -> Result<Article, StoreError> {
        validate_transition(from, to)?;
        let mut inner = self.inner.lock().await;
        let article = inner
            .articles
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        if !from.contains(&article.status) {
            return Err(StoreError::StaleTransition {
                id,
                actual: article.status,
                expected: from.to_vec(),
            });
        }
        article.status = to;
        apply_patch(article, patch);
        Ok(article.clone())
    }

    async fn count_by_status(&self) -> Result<HashMap<ArticleStatus, u64>, StoreError> {
        let inner = self.inner.lock().await;
        let mut counts: HashMap<ArticleStatus, u64> =
            ArticleStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for article in inner.articles.values() {
            *counts.entry(article.status).or_default() += 1;
        }
        Ok(counts)
    }

    async fn ranking_candidates(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(sorted_matching(&inner, limit, |a| {
            a.status == ArticleStatus::Raw && !a.ranked
        }))
    }

    async fn curation_candidates(
        &self,
        require_ranked: bool,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(sorted_matching(&inner, limit, |a| {
            a.status == ArticleStatus::Raw && (!require_ranked || a.ranked)
        }))
    }

    async fn image_resume_candidates(
        &self,
        max_retries: u32,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(min_age.as_secs() as i64);
        let inner = self.inner.lock().await;
        Ok(sorted_matching(&inner, limit, |a| {
            a.status == ArticleStatus::GeneratingImages
                && !a.images.is_complete()
                && a.image_retry_count < max_retries
                && a.updated_at <= cutoff
        }))
    }

    async fn broadcast_candidates(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(sorted_matching(&inner, limit, |a| {
            a.status == ArticleStatus::Processed && !a.broadcast
        }))
    }

    async fn requeue(&self, id: Uuid, to: ArticleStatus) -> Result<Article, StoreError> {
        validate_requeue(to)?;
        let mut inner = self.inner.lock().await;
        let article = inner
            .articles
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        if article.status != ArticleStatus::Error {
            return Err(StoreError::StaleTransition {
                id,
                actual: article.status,
                expected: vec![ArticleStatus::Error],
            });
        }
        article.status = to;
        article.error_stage = None;
        article.error_reason = None;
        if to == ArticleStatus::Curated {
            article.image_retry_count = 0;
        }
        article.updated_at = Utc::now();
        Ok(article.clone())
    }

    async fn mark_published(&self, id: Uuid, published: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let article = inner
            .articles
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        article.published = published;
        article.updated_at = Utc::now();
        Ok(())
    }

    async fn record_view(&self, id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let article = inner
            .articles
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        article.views += 1;
        Ok(article.views)
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn add_subscriber(
        &self,
        chat_id: i64,
        username: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.subscribers.get_mut(&chat_id) {
            Some(existing) => {
                existing.active = true;
                existing.username = username;
            }
            None => {
                inner.subscribers.insert(
                    chat_id,
                    Subscriber {
                        chat_id,
                        username,
                        active: true,
                        subscribed_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn remove_subscriber(&self, chat_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(s) = inner.subscribers.get_mut(&chat_id) {
            s.active = false;
        }
        Ok(())
    }

    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let inner = self.inner.lock().await;
        let mut subs: Vec<Subscriber> = inner
            .subscribers
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.chat_id);
        Ok(subs)
    }

    async fn subscriber_count(&self) -> Result<u64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.subscribers.values().filter(|s| s.active).count() as u64)
    }
}
