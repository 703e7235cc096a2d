pub mod backoff;
pub mod config;
pub mod error;
pub mod status;
pub mod types;

pub use config::Config;
pub use error::{AdapterError, ParseError, StoreError};
pub use status::ArticleStatus;
pub use types::{
    Article, ArticlePatch, CuratedContent, Destination, Entities, ImageAsset, ImageSet,
    InstagramContent, NewArticle, PlatformContent, Subscriber, TelegramContent, WebsiteContent,
};
