use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::ArticleStatus;

/// A platform we produce content and imagery for. Order matters: image
/// generation walks destinations in this order so a resumed article picks up
/// where the last run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Website,
    Telegram,
    Instagram,
}

impl Destination {
    pub const ALL: [Destination; 3] = [
        Destination::Website,
        Destination::Telegram,
        Destination::Instagram,
    ];

    /// Target image dimensions (width, height) for this destination.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Destination::Website => (1280, 720),
            Destination::Telegram => (512, 512),
            Destination::Instagram => (1080, 1350),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Website => "website",
            Destination::Telegram => "telegram",
            Destination::Instagram => "instagram",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    pub people: Vec<String>,
    pub organizations: Vec<String>,
    pub locations: Vec<String>,
}

/// Output of the curation stage. Written once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedContent {
    pub summary: String,
    pub rewritten_content: String,
    pub entities: Entities,
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteContent {
    pub headline: String,
    pub summary: String,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramContent {
    pub teaser: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstagramContent {
    pub caption: String,
    pub hashtags: Vec<String>,
}

/// Per-destination renditions of the curated article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformContent {
    pub website: WebsiteContent,
    pub telegram: TelegramContent,
    pub instagram: InstagramContent,
}

/// A generated and hosted image for one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub url: String,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

/// Images accumulate one destination at a time; a present entry is final and
/// is never regenerated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    pub website: Option<ImageAsset>,
    pub telegram: Option<ImageAsset>,
    pub instagram: Option<ImageAsset>,
}

impl ImageSet {
    pub fn get(&self, dest: Destination) -> Option<&ImageAsset> {
        match dest {
            Destination::Website => self.website.as_ref(),
            Destination::Telegram => self.telegram.as_ref(),
            Destination::Instagram => self.instagram.as_ref(),
        }
    }

    pub fn set(&mut self, dest: Destination, asset: ImageAsset) {
        match dest {
            Destination::Website => self.website = Some(asset),
            Destination::Telegram => self.telegram = Some(asset),
            Destination::Instagram => self.instagram = Some(asset),
        }
    }

    pub fn is_complete(&self) -> bool {
        Destination::ALL.iter().all(|d| self.get(*d).is_some())
    }

    pub fn missing(&self) -> Vec<Destination> {
        Destination::ALL
            .iter()
            .copied()
            .filter(|d| self.get(*d).is_none())
            .collect()
    }

    pub fn count(&self) -> usize {
        Destination::ALL.iter().filter(|d| self.get(**d).is_some()).count()
    }
}

/// An article as held in the store. The `url` is the dedup identity; `id` is
/// the handle everything else uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub description: String,
    pub source: String,
    pub api_source: String,
    pub content: String,
    pub status: ArticleStatus,
    pub ranked: bool,
    pub curated: Option<CuratedContent>,
    pub platforms: Option<PlatformContent>,
    pub images: ImageSet,
    pub image_retry_count: u32,
    pub broadcast: bool,
    pub broadcast_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_stage: Option<String>,
    pub error_reason: Option<String>,
    pub published: bool,
    pub views: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn from_new(new: NewArticle) -> Self {
        let now = Utc::now();
        Article {
            id: Uuid::new_v4(),
            url: new.url,
            title: new.title,
            description: new.description,
            source: new.source,
            api_source: new.api_source,
            content: new.content,
            status: ArticleStatus::Raw,
            ranked: false,
            curated: None,
            platforms: None,
            images: ImageSet::default(),
            image_retry_count: 0,
            broadcast: false,
            broadcast_at: None,
            processed_at: None,
            error_stage: None,
            error_reason: None,
            published: false,
            views: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What a fetch produces before the store assigns identity and status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub description: String,
    pub source: String,
    pub api_source: String,
    pub content: String,
}

/// Field updates applied atomically with a status transition. Absent fields
/// are left untouched; `image` merges a single destination into the set.
#[derive(Debug, Clone, Default)]
pub struct ArticlePatch {
    pub ranked: Option<bool>,
    pub curated: Option<CuratedContent>,
    pub platforms: Option<PlatformContent>,
    pub image: Option<(Destination, ImageAsset)>,
    pub image_retry_count: Option<u32>,
    pub processed_at: Option<DateTime<Utc>>,
    pub broadcast_at: Option<DateTime<Utc>>,
    pub error_stage: Option<String>,
    pub error_reason: Option<String>,
}

impl ArticlePatch {
    pub fn ranked(value: bool) -> Self {
        ArticlePatch {
            ranked: Some(value),
            ..Default::default()
        }
    }

    pub fn curated(content: CuratedContent, platforms: PlatformContent) -> Self {
        ArticlePatch {
            curated: Some(content),
            platforms: Some(platforms),
            ..Default::default()
        }
    }

    pub fn image(dest: Destination, asset: ImageAsset) -> Self {
        ArticlePatch {
            image: Some((dest, asset)),
            ..Default::default()
        }
    }

    pub fn error(stage: &str, reason: impl Into<String>) -> Self {
        ArticlePatch {
            error_stage: Some(stage.to_string()),
            error_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: i64,
    pub username: Option<String>,
    pub active: bool,
    pub subscribed_at: DateTime<Utc>,
}
