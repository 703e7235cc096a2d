//! Headline sources and article body extraction. Each source is a thin JSON
//! API client; extraction pulls paragraph text out of the article page.

use std::time::Duration;

use async_trait::async_trait;
use newsdesk_common::AdapterError;
use serde::Deserialize;
use tracing::debug;

/// Shortest extracted body we accept. Anything under this is a paywall stub
/// or a cookie wall, not an article.
pub const MIN_BODY_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct Headline {
    pub title: String,
    pub description: String,
    pub url: String,
    pub source_name: String,
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &str;

    async fn top_headlines(
        &self,
        category: &str,
        count: usize,
    ) -> Result<Vec<Headline>, AdapterError>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Full body text of the article page, or None when too little is found.
    async fn extract_full_text(&self, url: &str) -> Result<Option<String>, AdapterError>;
}

/// One headline per publication, keeping the incoming order, so a single
/// chatty outlet cannot fill the whole batch.
pub fn select_diverse(headlines: Vec<Headline>, count: usize) -> Vec<Headline> {
    let mut seen: Vec<String> = Vec::new();
    let mut picked = Vec::new();
    for h in headlines {
        if picked.len() >= count {
            break;
        }
        let key = h.source_name.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        picked.push(h);
    }
    picked
}

/// Paragraph text of an HTML document, or None below the length floor.
pub fn extract_paragraphs(html: &str) -> Option<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse("p").ok()?;
    let paragraphs: Vec<String> = document
        .select(&selector)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let body = paragraphs.join("\n\n");
    if body.chars().count() < MIN_BODY_CHARS {
        None
    } else {
        Some(body)
    }
}

fn classify_status(status: reqwest::StatusCode, context: &str) -> Option<AdapterError> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Some(AdapterError::RateLimited { retry_after: None });
    }
    if status.is_server_error() {
        return Some(AdapterError::Transient(format!("{context} returned {status}")));
    }
    if !status.is_success() {
        return Some(AdapterError::Permanent(format!("{context} returned {status}")));
    }
    None
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    title: Option<String>,
    description: Option<String>,
    url: String,
    source: NewsApiSource,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

pub struct NewsApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl NewsApiClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self::with_base_url(api_key, "https://newsapi.org/v2", timeout)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        NewsApiClient {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl NewsSource for NewsApiClient {
    fn name(&self) -> &str {
        "newsapi"
    }

    async fn top_headlines(
        &self,
        category: &str,
        count: usize,
    ) -> Result<Vec<Headline>, AdapterError> {
        let page_size = count.to_string();
        let response = self
            .client
            .get(format!("{}/top-headlines", self.base_url))
            .timeout(self.timeout)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("category", category),
                ("language", "en"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(AdapterError::from_request)?;

        if let Some(err) = classify_status(response.status(), "newsapi") {
            return Err(err);
        }

        let parsed: NewsApiResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Transient(format!("malformed newsapi body: {e}")))?;

        let headlines = parsed
            .articles
            .into_iter()
            .filter_map(|a| {
                Some(Headline {
                    title: a.title?,
                    description: a.description.unwrap_or_default(),
                    url: a.url,
                    source_name: a.source.name.unwrap_or_default(),
                })
            })
            .collect();
        Ok(headlines)
    }
}

#[derive(Debug, Deserialize)]
struct GNewsResponse {
    articles: Vec<GNewsArticle>,
}

#[derive(Debug, Deserialize)]
struct GNewsArticle {
    title: String,
    description: Option<String>,
    url: String,
    source: GNewsSource,
}

#[derive(Debug, Deserialize)]
struct GNewsSource {
    name: Option<String>,
}

pub struct GNewsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl GNewsClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self::with_base_url(api_key, "https://gnews.io/api/v4", timeout)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        GNewsClient {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl NewsSource for GNewsClient {
    fn name(&self) -> &str {
        "gnews"
    }

    async fn top_headlines(
        &self,
        category: &str,
        count: usize,
    ) -> Result<Vec<Headline>, AdapterError> {
        let response = self
            .client
            .get(format!("{}/top-headlines", self.base_url))
            .timeout(self.timeout)
            .query(&[
                ("category", category),
                ("lang", "en"),
                ("max", count.to_string().as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(AdapterError::from_request)?;

        if let Some(err) = classify_status(response.status(), "gnews") {
            return Err(err);
        }

        let parsed: GNewsResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Transient(format!("malformed gnews body: {e}")))?;

        Ok(parsed
            .articles
            .into_iter()
            .map(|a| Headline {
                title: a.title,
                description: a.description.unwrap_or_default(),
                url: a.url,
                source_name: a.source.name.unwrap_or_default(),
            })
            .collect())
    }
}

/// Fetches the article page and keeps its paragraph text.
pub struct HttpTextExtractor {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTextExtractor {
    pub fn new(timeout: Duration) -> Self {
        HttpTextExtractor {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl TextExtractor for HttpTextExtractor {
    async fn extract_full_text(&self, url: &str) -> Result<Option<String>, AdapterError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header("User-Agent", "Mozilla/5.0 (compatible; newsdesk/0.1)")
            .send()
            .await
            .map_err(AdapterError::from_request)?;

        if let Some(err) = classify_status(response.status(), "article page") {
            return Err(err);
        }

        let html = response.text().await.map_err(AdapterError::from_request)?;
        let body = extract_paragraphs(&html);
        debug!(url, found = body.is_some(), "article body extracted");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headline(title: &str, source: &str) -> Headline {
        Headline {
            title: title.to_string(),
            description: String::new(),
            url: format!("https://example.com/{title}"),
            source_name: source.to_string(),
        }
    }

    #[test]
    fn diversity_keeps_one_headline_per_outlet() {
        let picked = select_diverse(
            vec![
                headline("a", "Wire"),
                headline("b", "Wire"),
                headline("c", "Herald"),
                headline("d", "wire"),
                headline("e", "Post"),
            ],
            5,
        );
        let titles: Vec<_> = picked.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c", "e"]);
    }

    #[test]
    fn diversity_respects_count() {
        let picked = select_diverse(
            vec![
                headline("a", "Wire"),
                headline("b", "Herald"),
                headline("c", "Post"),
            ],
            2,
        );
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn extraction_joins_paragraphs() {
        let html = format!(
            "<html><body><nav>menu</nav><p>{}</p><p>{}</p></body></html>",
            "First paragraph with enough substance to matter here.",
            "Second paragraph, also long enough to keep the floor satisfied."
        );
        let body = extract_paragraphs(&html).unwrap();
        assert!(body.contains("First paragraph"));
        assert!(body.contains("\n\nSecond paragraph"));
        assert!(!body.contains("menu"));
    }

    #[test]
    fn extraction_rejects_stub_pages() {
        assert_eq!(extract_paragraphs("<html><p>Subscribe now.</p></html>"), None);
        assert_eq!(extract_paragraphs("<html><div>no paragraphs</div></html>"), None);
    }
}
