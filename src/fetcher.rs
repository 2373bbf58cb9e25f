use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use feed_rs::parser;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::{FetchError, MalformedEntry};

/// Longest summary kept, in characters.
pub const MAX_SUMMARY_CHARS: usize = 1000;

/// An entry as the feed parser produced it. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// A classified entry that has not yet been checked against the store.
///
/// Equality and hashing cover every field, so two items are duplicates only
/// when they are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CandidateItem {
    pub title: String,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
    pub link: String,
    pub category: String,
}

impl CandidateItem {
    pub fn from_raw(
        raw: RawEntry,
        category: &str,
        require_summary: bool,
    ) -> Result<Self, MalformedEntry> {
        let title = non_blank(raw.title).ok_or(MalformedEntry::missing("title"))?;
        let link = non_blank(raw.link)
            .filter(|link| is_web_link(link))
            .ok_or(MalformedEntry::missing("link"))?;
        // Four-digit years only, so the stored text sorts chronologically
        let published = raw
            .published
            .filter(|p| (0..=9999).contains(&p.year()))
            .ok_or(MalformedEntry::missing("publish time"))?;

        let summary = non_blank(raw.summary).map(|s| truncate_chars(s, MAX_SUMMARY_CHARS));
        if require_summary && summary.is_none() {
            return Err(MalformedEntry::missing("summary"));
        }

        Ok(Self {
            title,
            summary,
            // Stored with second precision
            published_at: published.with_nanosecond(0).unwrap_or(published),
            link,
            category: category.to_string(),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_web_link(link: &str) -> bool {
    reqwest::Url::parse(link)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn truncate_chars(value: String, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((end, _)) => value[..end].to_string(),
        None => value,
    }
}

/// Parse an RSS or Atom document into raw entries.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<RawEntry>, FetchError> {
    let parsed = parser::parse(bytes)?;

    Ok(parsed
        .entries
        .into_iter()
        .map(|entry| {
            // Prefer the article's alternate link over comments/enclosures
            let link = entry
                .links
                .iter()
                .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone());

            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));

            RawEntry {
                title: entry.title.map(|t| t.content),
                summary,
                link,
                published: entry.published.or(entry.updated),
            }
        })
        .collect())
}

/// Transport for feed documents.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFeedClient {
    client: Client,
}

impl HttpFeedClient {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Fetches and parses one source, retrying with a fixed delay.
pub struct Fetcher {
    client: Arc<dyn FeedClient>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Fetcher {
    pub fn new(client: Arc<dyn FeedClient>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = HttpFeedClient::new(config)?;
        Ok(Self::new(
            Arc::new(client),
            config.max_attempts,
            config.retry_delay(),
        ))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the last attempt's error once every attempt has failed.
    pub async fn fetch_entries(&self, url: &str) -> Result<Vec<RawEntry>, FetchError> {
        let mut attempt = 1;
        loop {
            let result = match self.client.fetch_document(url).await {
                Ok(bytes) => parse_feed(&bytes),
                Err(e) => Err(e),
            };

            match result {
                Ok(entries) => {
                    debug!("Fetched {} entries from {} on attempt {}", entries.len(), url, attempt);
                    return Ok(entries);
                }
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt, self.max_attempts, url, e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
