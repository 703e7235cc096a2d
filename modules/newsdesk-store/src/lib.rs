//! Article and subscriber persistence. Two backends behind the same traits:
//! `MemoryStore` for tests and single-shot runs, `PgStore` for production.
//! The `transition` compare-and-swap is the only mutation path for pipeline
//! state and the only concurrency mechanism the pipeline relies on.

mod memory;
mod postgres;

#[cfg(test)]
mod store_tests;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use newsdesk_common::{Article, ArticlePatch, ArticleStatus, NewArticle, StoreError, Subscriber};
use uuid::Uuid;

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert a fetched article as `raw`. The url is the dedup key.
    async fn insert(&self, new: NewArticle) -> Result<Article, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Article, StoreError>;

    /// Oldest-created-first, so retried articles keep their place in line.
    async fn find_by_status(
        &self,
        status: ArticleStatus,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError>;

    /// Atomic compare-and-swap: the update applies only if the article's
    /// current status is one of `from`. Losers get `StaleTransition` and
    /// must not apply their patch any other way.
    async fn transition(
        &self,
        id: Uuid,
        from: &[ArticleStatus],
        to: ArticleStatus,
        patch: ArticlePatch,
    ) -> Result<Article, StoreError>;

    async fn count_by_status(&self) -> Result<HashMap<ArticleStatus, u64>, StoreError>;

    /// Raw articles ranking has not yet looked at.
    async fn ranking_candidates(&self, limit: usize) -> Result<Vec<Article>, StoreError>;

    /// Raw articles eligible for curation. With ranking on, only ranked ones.
    async fn curation_candidates(
        &self,
        require_ranked: bool,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError>;

    /// Articles stuck in `generating_images` with an incomplete image set
    /// and retries left. Completed destinations are kept as-is. `min_age`
    /// filters out articles touched recently, so a run never picks up an
    /// article another process is actively working on.
    async fn image_resume_candidates(
        &self,
        max_retries: u32,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError>;

    /// Processed articles not yet broadcast.
    async fn broadcast_candidates(&self, limit: usize) -> Result<Vec<Article>, StoreError>;

    /// Operator override: move an errored article back into the pipeline.
    /// Clears the stored failure; resets image retries when re-entering the
    /// image stage.
    async fn requeue(&self, id: Uuid, to: ArticleStatus) -> Result<Article, StoreError>;

    async fn mark_published(&self, id: Uuid, published: bool) -> Result<(), StoreError>;

    async fn record_view(&self, id: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Idempotent: re-adding reactivates an existing subscriber.
    async fn add_subscriber(
        &self,
        chat_id: i64,
        username: Option<String>,
    ) -> Result<(), StoreError>;

    /// Deactivates rather than deletes, so resubscription keeps history.
    async fn remove_subscriber(&self, chat_id: i64) -> Result<(), StoreError>;

    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;

    async fn subscriber_count(&self) -> Result<u64, StoreError>;
}

/// Every status in `from` must legally reach `to`; a transition request that
/// could succeed from an illegal state is a bug in the caller.
pub(crate) fn validate_transition(
    from: &[ArticleStatus],
    to: ArticleStatus,
) -> Result<(), StoreError> {
    for f in from {
        if !f.can_reach(to) {
            return Err(StoreError::IllegalTransition { from: *f, to });
        }
    }
    Ok(())
}

pub(crate) fn validate_requeue(to: ArticleStatus) -> Result<(), StoreError> {
    if ArticleStatus::requeue_targets().contains(&to) {
        Ok(())
    } else {
        Err(StoreError::IllegalTransition {
            from: ArticleStatus::Error,
            to,
        })
    }
}
