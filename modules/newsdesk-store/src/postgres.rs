use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_common::{
    Article, ArticlePatch, ArticleStatus, CuratedContent, ImageSet, NewArticle, PlatformContent,
    StoreError, Subscriber,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::{validate_requeue, validate_transition, ArticleStore, SubscriberStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id UUID PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    api_source TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    ranked BOOLEAN NOT NULL DEFAULT FALSE,
    curated JSONB,
    platforms JSONB,
    images JSONB NOT NULL DEFAULT '{}'::jsonb,
    image_retry_count INT NOT NULL DEFAULT 0,
    broadcast BOOLEAN NOT NULL DEFAULT FALSE,
    broadcast_at TIMESTAMPTZ,
    processed_at TIMESTAMPTZ,
    error_stage TEXT,
    error_reason TEXT,
    published BOOLEAN NOT NULL DEFAULT FALSE,
    views BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_status ON articles (status, created_at);

CREATE TABLE IF NOT EXISTS subscribers (
    chat_id BIGINT PRIMARY KEY,
    username TEXT,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    subscribed_at TIMESTAMPTZ NOT NULL
);
"#;

const ARTICLE_COLUMNS: &str = "id, url, title, description, source, api_source, content, status, \
     ranked, curated, platforms, images, image_retry_count, broadcast, broadcast_at, \
     processed_at, error_stage, error_reason, published, views, created_at, updated_at";

/// Postgres backend. The compare-and-swap rides on a single UPDATE with a
/// status guard in the WHERE clause; rows_affected tells winners from
/// losers.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(PgStore { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("article store schema ensured");
        Ok(())
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(
    row: &PgRow,
    column: &str,
) -> Result<Option<T>, sqlx::Error> {
    let value: Option<serde_json::Value> = row.try_get(column)?;
    match value {
        None => Ok(None),
        Some(v) => serde_json::from_value(v)
            .map(Some)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: column.to_string(),
                source: Box::new(e),
            }),
    }
}

/// Local newtype so the `FromRow` impl satisfies the orphan rule;
/// `Article` itself lives in `newsdesk-common`.
struct ArticleRow(Article);

impl sqlx::FromRow<'_, PgRow> for ArticleRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let status_text: String = row.try_get("status")?;
        let status = ArticleStatus::parse(&status_text).ok_or_else(|| {
            sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: format!("unknown status {status_text}").into(),
            }
        })?;
        let curated: Option<CuratedContent> = decode_json(row, "curated")?;
        let platforms: Option<PlatformContent> = decode_json(row, "platforms")?;
        let images: ImageSet = decode_json(row, "images")?.unwrap_or_default();
        let retry: i32 = row.try_get("image_retry_count")?;
        let views: i64 = row.try_get("views")?;

        Ok(ArticleRow(Article {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            source: row.try_get("source")?,
            api_source: row.try_get("api_source")?,
            content: row.try_get("content")?,
            status,
            ranked: row.try_get("ranked")?,
            curated,
            platforms,
            images,
            image_retry_count: retry.max(0) as u32,
            broadcast: row.try_get("broadcast")?,
            broadcast_at: row.try_get("broadcast_at")?,
            processed_at: row.try_get("processed_at")?,
            error_stage: row.try_get("error_stage")?,
            error_reason: row.try_get("error_reason")?,
            published: row.try_get("published")?,
            views: views.max(0) as u64,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.into())
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(e.into()))
}

fn status_names(statuses: &[ArticleStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl ArticleStore for PgStore {
    async fn insert(&self, new: NewArticle) -> Result<Article, StoreError> {
        let article = Article::from_new(new);
        let result = sqlx::query(
            "INSERT INTO articles (id, url, title, description, source, api_source, content, \
             status, images, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(article.id)
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.source)
        .bind(&article.api_source)
        .bind(&article.content)
        .bind(article.status.as_str())
        .bind(encode_json(&article.images)?)
        .bind(article.created_at)
        .bind(article.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(article),
            Err(e) => {
                let unique = e
                    .as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false);
                if unique {
                    Err(StoreError::DuplicateKey { url: article.url })
                } else {
                    Err(backend(e))
                }
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Article, StoreError> {
        sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .map(|row| row.0)
        .ok_or(StoreError::NotFound(id))
    }

    async fn find_by_status(
        &self,
        status: ArticleStatus,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE status = $1 \
             ORDER BY created_at ASC, id ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(|row| row.0).collect())
        .map_err(backend)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[ArticleStatus],
        to: ArticleStatus,
        patch: ArticlePatch,
    ) -> Result<Article, StoreError> {
        validate_transition(from, to)?;

        let curated = patch.curated.as_ref().map(encode_json).transpose()?;
        let platforms = patch.platforms.as_ref().map(encode_json).transpose()?;
        let (image_dest, image_asset) = match &patch.image {
            Some((dest, asset)) => (Some(dest.as_str().to_string()), Some(encode_json(asset)?)),
            None => (None, None),
        };

        let updated = sqlx::query_as::<_, ArticleRow>(&format!(
            "UPDATE articles SET \
                status = $3, \
                ranked = COALESCE($4, ranked), \
                curated = COALESCE($5, curated), \
                platforms = COALESCE($6, platforms), \
                images = CASE WHEN $7::text IS NOT NULL \
                    THEN jsonb_set(images, ARRAY[$7], $8::jsonb) ELSE images END, \
                image_retry_count = COALESCE($9, image_retry_count), \
                processed_at = COALESCE($10, processed_at), \
                broadcast = broadcast OR $11::timestamptz IS NOT NULL, \
                broadcast_at = COALESCE($11, broadcast_at), \
                error_stage = COALESCE($12, error_stage), \
                error_reason = COALESCE($13, error_reason), \
                updated_at = NOW() \
             WHERE id = $1 AND status = ANY($2) \
             RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(id)
        .bind(status_names(from))
        .bind(to.as_str())
        .bind(patch.ranked)
        .bind(curated)
        .bind(platforms)
        .bind(image_dest)
        .bind(image_asset)
        .bind(patch.image_retry_count.map(|c| c as i32))
        .bind(patch.processed_at)
        .bind(patch.broadcast_at)
        .bind(patch.error_stage)
        .bind(patch.error_reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match updated {
            Some(article) => Ok(article.0),
            // Lost the race or the id is gone; look once to tell which.
            None => {
                let current = self.get(id).await?;
                Err(StoreError::StaleTransition {
                    id,
                    actual: current.status,
                    expected: from.to_vec(),
                })
            }
        }
    }

    async fn count_by_status(&self) -> Result<HashMap<ArticleStatus, u64>, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM articles GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        let mut counts: HashMap<ArticleStatus, u64> =
            ArticleStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for row in rows {
            let name: String = row.try_get("status").map_err(backend)?;
            let n: i64 = row.try_get("n").map_err(backend)?;
            if let Some(status) = ArticleStatus::parse(&name) {
                counts.insert(status, n.max(0) as u64);
            }
        }
        Ok(counts)
    }

    async fn ranking_candidates(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE status = 'raw' AND ranked = FALSE \
             ORDER BY created_at ASC, id ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(|row| row.0).collect())
        .map_err(backend)
    }

    async fn curation_candidates(
        &self,
        require_ranked: bool,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE status = 'raw' AND ($1 = FALSE OR ranked) \
             ORDER BY created_at ASC, id ASC LIMIT $2"
        ))
        .bind(require_ranked)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(|row| row.0).collect())
        .map_err(backend)
    }

    async fn image_resume_candidates(
        &self,
        max_retries: u32,
        min_age: Duration,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE status = 'generating_images' \
               AND image_retry_count < $1 \
               AND updated_at <= NOW() - make_interval(secs => $2) \
               AND (images->>'website' IS NULL \
                 OR images->>'telegram' IS NULL \
                 OR images->>'instagram' IS NULL) \
             ORDER BY created_at ASC, id ASC LIMIT $3"
        ))
        .bind(max_retries as i32)
        .bind(min_age.as_secs_f64())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(|row| row.0).collect())
        .map_err(backend)
    }

    async fn broadcast_candidates(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE status = 'processed' AND broadcast = FALSE \
             ORDER BY created_at ASC, id ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(|row| row.0).collect())
        .map_err(backend)
    }

    async fn requeue(&self, id: Uuid, to: ArticleStatus) -> Result<Article, StoreError> {
        validate_requeue(to)?;
        let reset_retries = to == ArticleStatus::Curated;
        let updated = sqlx::query_as::<_, ArticleRow>(&format!(
            "UPDATE articles SET \
                status = $2, \
                error_stage = NULL, \
                error_reason = NULL, \
                image_retry_count = CASE WHEN $3 THEN 0 ELSE image_retry_count END, \
                updated_at = NOW() \
             WHERE id = $1 AND status = 'error' \
             RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(id)
        .bind(to.as_str())
        .bind(reset_retries)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match updated {
            Some(article) => Ok(article.0),
            None => {
                let current = self.get(id).await?;
                Err(StoreError::StaleTransition {
                    id,
                    actual: current.status,
                    expected: vec![ArticleStatus::Error],
                })
            }
        }
    }

    async fn mark_published(&self, id: Uuid, published: bool) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE articles SET published = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(published)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn record_view(&self, id: Uuid) -> Result<u64, StoreError> {
        let views: Option<i64> = sqlx::query_scalar(
            "UPDATE articles SET views = views + 1 WHERE id = $1 RETURNING views",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        views
            .map(|v| v.max(0) as u64)
            .ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl SubscriberStore for PgStore {
    async fn add_subscriber(
        &self,
        chat_id: i64,
        username: Option<String>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO subscribers (chat_id, username, active, subscribed_at) \
             VALUES ($1, $2, TRUE, $3) \
             ON CONFLICT (chat_id) DO UPDATE SET active = TRUE, username = $2",
        )
        .bind(chat_id)
        .bind(username)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn remove_subscriber(&self, chat_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE subscribers SET active = FALSE WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        let rows = sqlx::query(
            "SELECT chat_id, username, active, subscribed_at FROM subscribers \
             WHERE active = TRUE ORDER BY chat_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|row| {
                Ok(Subscriber {
                    chat_id: row.try_get("chat_id").map_err(backend)?,
                    username: row.try_get("username").map_err(backend)?,
                    active: row.try_get("active").map_err(backend)?,
                    subscribed_at: row
                        .try_get::<DateTime<Utc>, _>("subscribed_at")
                        .map_err(backend)?,
                })
            })
            .collect()
    }

    async fn subscriber_count(&self) -> Result<u64, StoreError> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscribers WHERE active = TRUE")
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;
        Ok(n.max(0) as u64)
    }
}
