use std::sync::Arc;
use std::time::Duration;

use newsdesk_common::{
    ArticlePatch, ArticleStatus, CuratedContent, Destination, Entities, ImageAsset,
    InstagramContent, NewArticle, PlatformContent, StoreError, TelegramContent, WebsiteContent,
};

use crate::{ArticleStore, MemoryStore, SubscriberStore};

fn new_article(n: usize) -> NewArticle {
    NewArticle {
        url: format!("https://news.example.com/story-{n}"),
        title: format!("Story {n}"),
        description: format!("Teaser for story {n}"),
        source: "Example Times".to_string(),
        api_source: "newsapi".to_string(),
        content: "Several paragraphs of article body text.".to_string(),
    }
}

fn curated_fixture() -> (CuratedContent, PlatformContent) {
    let curated = CuratedContent {
        summary: "A short summary.".to_string(),
        rewritten_content: "Rewritten body.".to_string(),
        entities: Entities {
            people: vec!["Ada Lovelace".to_string()],
            organizations: vec![],
            locations: vec!["London".to_string()],
        },
        hashtags: vec!["#news".to_string()],
    };
    let platforms = PlatformContent {
        website: WebsiteContent {
            headline: "Headline".to_string(),
            summary: "Site summary".to_string(),
            paragraphs: vec!["One.".to_string(), "Two.".to_string()],
        },
        telegram: TelegramContent {
            teaser: "Teaser".to_string(),
        },
        instagram: InstagramContent {
            caption: "Caption".to_string(),
            hashtags: vec!["#insta".to_string()],
        },
    };
    (curated, platforms)
}

fn asset(dest: Destination) -> ImageAsset {
    let (width, height) = dest.dimensions();
    ImageAsset {
        url: format!("https://img.example.com/{}.jpg", dest.as_str()),
        prompt: "an illustrative scene".to_string(),
        width,
        height,
    }
}

// Advances an article to generating_images with no images yet.
async fn claim_for_images(store: &MemoryStore, id: uuid::Uuid) {
    let (curated, platforms) = curated_fixture();
    store
        .transition(
            id,
            &[ArticleStatus::Raw],
            ArticleStatus::Curated,
            ArticlePatch::curated(curated, platforms),
        )
        .await
        .unwrap();
    store
        .transition(
            id,
            &[ArticleStatus::Curated],
            ArticleStatus::GeneratingImages,
            ArticlePatch::default(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_url_is_rejected_and_store_unchanged() {
    let store = MemoryStore::new();
    store.insert(new_article(1)).await.unwrap();

    let err = store.insert(new_article(1)).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { .. }));

    let raw = store.find_by_status(ArticleStatus::Raw, 10).await.unwrap();
    assert_eq!(raw.len(), 1);
}

#[tokio::test]
async fn find_by_status_returns_oldest_first() {
    let store = MemoryStore::new();
    let mut ids = Vec::new();
    for n in 0..3 {
        ids.push(store.insert(new_article(n)).await.unwrap().id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let raw = store.find_by_status(ArticleStatus::Raw, 10).await.unwrap();
    let got: Vec<_> = raw.iter().map(|a| a.id).collect();
    assert_eq!(got, ids);

    let limited = store.find_by_status(ArticleStatus::Raw, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, ids[0]);
}

#[tokio::test]
async fn concurrent_transitions_have_exactly_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let id = store.insert(new_article(1)).await.unwrap().id;
    let (curated, platforms) = curated_fixture();

    let a = {
        let store = store.clone();
        let patch = ArticlePatch::curated(curated.clone(), platforms.clone());
        tokio::spawn(async move {
            store
                .transition(id, &[ArticleStatus::Raw], ArticleStatus::Curated, patch)
                .await
        })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .transition(
                    id,
                    &[ArticleStatus::Raw],
                    ArticleStatus::Filtered,
                    ArticlePatch::default(),
                )
                .await
        })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let wins = [a.is_ok(), b.is_ok()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1);

    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(
        loser.unwrap_err(),
        StoreError::StaleTransition { .. }
    ));

    // the surviving state is exactly the winner's
    let article = store.get(id).await.unwrap();
    if article.status == ArticleStatus::Curated {
        assert!(article.curated.is_some());
    } else {
        assert_eq!(article.status, ArticleStatus::Filtered);
        assert!(article.curated.is_none());
    }
}

#[tokio::test]
async fn transition_rejects_skipped_stages() {
    let store = MemoryStore::new();
    let id = store.insert(new_article(1)).await.unwrap().id;

    let err = store
        .transition(
            id,
            &[ArticleStatus::Raw],
            ArticleStatus::Processed,
            ArticlePatch::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::IllegalTransition { .. }));

    // nothing moved
    let article = store.get(id).await.unwrap();
    assert_eq!(article.status, ArticleStatus::Raw);
}

#[tokio::test]
async fn image_patch_merges_one_destination_at_a_time() {
    let store = MemoryStore::new();
    let id = store.insert(new_article(1)).await.unwrap().id;
    claim_for_images(&store, id).await;

    store
        .transition(
            id,
            &[ArticleStatus::GeneratingImages],
            ArticleStatus::GeneratingImages,
            ArticlePatch::image(Destination::Website, asset(Destination::Website)),
        )
        .await
        .unwrap();

    let article = store.get(id).await.unwrap();
    assert!(article.images.website.is_some());
    assert!(article.images.telegram.is_none());
    assert!(article.images.instagram.is_none());
    assert_eq!(article.images.missing().len(), 2);
}

#[tokio::test]
async fn image_resume_candidates_respect_retry_cap_and_completeness() {
    let store = MemoryStore::new();

    let resumable = store.insert(new_article(1)).await.unwrap().id;
    claim_for_images(&store, resumable).await;

    let exhausted = store.insert(new_article(2)).await.unwrap().id;
    claim_for_images(&store, exhausted).await;
    store
        .transition(
            exhausted,
            &[ArticleStatus::GeneratingImages],
            ArticleStatus::GeneratingImages,
            ArticlePatch {
                image_retry_count: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let complete = store.insert(new_article(3)).await.unwrap().id;
    claim_for_images(&store, complete).await;
    for dest in Destination::ALL {
        store
            .transition(
                complete,
                &[ArticleStatus::GeneratingImages],
                ArticleStatus::GeneratingImages,
                ArticlePatch::image(dest, asset(dest)),
            )
            .await
            .unwrap();
    }

    let candidates = store
        .image_resume_candidates(3, Duration::ZERO, 10)
        .await
        .unwrap();
    let ids: Vec<_> = candidates.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![resumable]);

    // a fresh article is invisible behind a grace period
    let candidates = store
        .image_resume_candidates(3, Duration::from_secs(3600), 10)
        .await
        .unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn curation_candidates_honor_ranking_flag() {
    let store = MemoryStore::new();
    let unranked = store.insert(new_article(1)).await.unwrap().id;
    let ranked = store.insert(new_article(2)).await.unwrap().id;
    store
        .transition(
            ranked,
            &[ArticleStatus::Raw],
            ArticleStatus::Raw,
            ArticlePatch::ranked(true),
        )
        .await
        .unwrap();

    let only_ranked = store.curation_candidates(true, 10).await.unwrap();
    assert_eq!(only_ranked.len(), 1);
    assert_eq!(only_ranked[0].id, ranked);

    let all_raw = store.curation_candidates(false, 10).await.unwrap();
    let mut ids: Vec<_> = all_raw.iter().map(|a| a.id).collect();
    ids.sort();
    let mut expected = vec![unranked, ranked];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn broadcast_candidates_exclude_already_broadcast() {
    let store = MemoryStore::new();
    let id = store.insert(new_article(1)).await.unwrap().id;
    claim_for_images(&store, id).await;
    for dest in Destination::ALL {
        store
            .transition(
                id,
                &[ArticleStatus::GeneratingImages],
                ArticleStatus::GeneratingImages,
                ArticlePatch::image(dest, asset(dest)),
            )
            .await
            .unwrap();
    }
    store
        .transition(
            id,
            &[ArticleStatus::GeneratingImages],
            ArticleStatus::Processed,
            ArticlePatch {
                processed_at: Some(chrono::Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(store.broadcast_candidates(10).await.unwrap().len(), 1);

    store
        .transition(
            id,
            &[ArticleStatus::Processed],
            ArticleStatus::Processed,
            ArticlePatch {
                broadcast_at: Some(chrono::Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(store.broadcast_candidates(10).await.unwrap().is_empty());
    let article = store.get(id).await.unwrap();
    assert!(article.broadcast);
    assert!(article.broadcast_at.is_some());
}

#[tokio::test]
async fn requeue_only_moves_errored_articles() {
    let store = MemoryStore::new();
    let id = store.insert(new_article(1)).await.unwrap().id;

    let err = store.requeue(id, ArticleStatus::Raw).await.unwrap_err();
    assert!(matches!(err, StoreError::StaleTransition { .. }));

    store
        .transition(
            id,
            &[ArticleStatus::Raw],
            ArticleStatus::Error,
            ArticlePatch::error("curation", "model rejected the prompt"),
        )
        .await
        .unwrap();

    let err = store
        .requeue(id, ArticleStatus::Processed)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::IllegalTransition { .. }));

    let article = store.requeue(id, ArticleStatus::Raw).await.unwrap();
    assert_eq!(article.status, ArticleStatus::Raw);
    assert!(article.error_stage.is_none());
    assert!(article.error_reason.is_none());
}

#[tokio::test]
async fn count_by_status_covers_every_state() {
    let store = MemoryStore::new();
    store.insert(new_article(1)).await.unwrap();
    let filtered = store.insert(new_article(2)).await.unwrap().id;
    store
        .transition(
            filtered,
            &[ArticleStatus::Raw],
            ArticleStatus::Filtered,
            ArticlePatch::default(),
        )
        .await
        .unwrap();

    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts[&ArticleStatus::Raw], 1);
    assert_eq!(counts[&ArticleStatus::Filtered], 1);
    assert_eq!(counts[&ArticleStatus::Processed], 0);
    assert_eq!(counts.len(), ArticleStatus::ALL.len());
}

#[tokio::test]
async fn views_and_published_flags_update() {
    let store = MemoryStore::new();
    let id = store.insert(new_article(1)).await.unwrap().id;

    store.mark_published(id, true).await.unwrap();
    assert_eq!(store.record_view(id).await.unwrap(), 1);
    assert_eq!(store.record_view(id).await.unwrap(), 2);

    let article = store.get(id).await.unwrap();
    assert!(article.published);
    assert_eq!(article.views, 2);
}

#[tokio::test]
async fn subscribers_deactivate_and_reactivate() {
    let store = MemoryStore::new();
    store
        .add_subscriber(100, Some("ada".to_string()))
        .await
        .unwrap();
    store.add_subscriber(200, None).await.unwrap();
    assert_eq!(store.subscriber_count().await.unwrap(), 2);

    store.remove_subscriber(100).await.unwrap();
    assert_eq!(store.subscriber_count().await.unwrap(), 1);
    let active = store.active_subscribers().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].chat_id, 200);

    store
        .add_subscriber(100, Some("ada".to_string()))
        .await
        .unwrap();
    assert_eq!(store.subscriber_count().await.unwrap(), 2);
}
