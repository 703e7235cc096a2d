//! Read-mostly HTTP surface for the website and admin tooling. The pipeline
//! never goes through this; it owns the store directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use newsdesk_common::{Article, ArticleStatus, StoreError};
use newsdesk_store::ArticleStore;

type Store = Arc<dyn ArticleStore>;

pub fn router(store: Store) -> Router {
    Router::new()
        .route("/articles", get(list_articles))
        .route("/articles/{id}", get(get_article))
        .route("/articles/{id}/publish", post(publish_article))
        .route("/articles/{id}/view", post(record_view))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            StoreError::DuplicateKey { .. }
            | StoreError::StaleTransition { .. }
            | StoreError::IllegalTransition { .. } => (StatusCode::CONFLICT, self.0.to_string()),
            StoreError::Backend(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "store unavailable".to_string(),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Deserialize)]
struct ListParams {
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_articles(
    State(store): State<Store>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    let status = match params.status.as_deref() {
        Some(s) => match ArticleStatus::parse(s) {
            Some(status) => status,
            None => {
                return Ok((
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": format!("unknown status {s:?}") })),
                )
                    .into_response())
            }
        },
        None => ArticleStatus::Processed,
    };
    let limit = params.limit.unwrap_or(50).min(200);
    let articles = store.find_by_status(status, limit).await?;
    Ok(Json(articles).into_response())
}

async fn get_article(
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(store.get(id).await?))
}

async fn publish_article(
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    store.mark_published(id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn record_view(
    State(store): State<Store>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let views = store.record_view(id).await?;
    Ok(Json(serde_json::json!({ "views": views })))
}

async fn stats(
    State(store): State<Store>,
) -> Result<Json<BTreeMap<String, u64>>, ApiError> {
    let counts = store.count_by_status().await?;
    Ok(Json(
        counts
            .into_iter()
            .map(|(s, n)| (s.as_str().to_string(), n))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use newsdesk_common::NewArticle;
    use newsdesk_store::MemoryStore;
    use tower::ServiceExt;

    async fn seeded_router() -> (Router, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let article = store
            .insert(NewArticle {
                url: "https://news.example.com/story".to_string(),
                title: "Story".to_string(),
                description: "Teaser".to_string(),
                source: "Example Times".to_string(),
                api_source: "newsapi".to_string(),
                content: "Body.".to_string(),
            })
            .await
            .unwrap();
        (router(store), article.id)
    }

    #[tokio::test]
    async fn lists_articles_by_status() {
        let (app, _) = seeded_router().await;
        let response = app
            .oneshot(
                Request::get("/articles?status=raw")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let articles: Vec<Article> = serde_json::from_slice(&body).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Story");
    }

    #[tokio::test]
    async fn missing_article_is_404() {
        let (app, _) = seeded_router().await;
        let response = app
            .oneshot(
                Request::get(format!("/articles/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn publish_and_view_round_trip() {
        let (app, id) = seeded_router().await;
        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/articles/{id}/publish"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::post(format!("/articles/{id}/view"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["views"], 1);
    }

    #[tokio::test]
    async fn unknown_status_is_rejected() {
        let (app, _) = seeded_router().await;
        let response = app
            .oneshot(
                Request::get("/articles?status=bogus")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
