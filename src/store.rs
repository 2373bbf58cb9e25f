//! Article storage.
//!
//! The store is append-only: articles are inserted by the scheduler's commit
//! and read by the serving layer. There is no update or delete path.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::fetcher::CandidateItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
    pub link: String,
    pub category: String,
}

/// Result of one atomic commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub inserted: u64,
    /// Rows dropped because their link was already taken
    pub skipped: u64,
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Persist `batch` as one atomic operation.
    ///
    /// Rows whose link already exists (in the store or earlier in the same
    /// batch) are skipped and the remainder is committed. Any other failure
    /// leaves the store untouched.
    async fn commit(&self, batch: &[CandidateItem]) -> Result<CommitOutcome, StoreError>;

    async fn exists_by_link(&self, link: &str) -> Result<bool, StoreError>;

    /// The subset of `links` already present in the store.
    async fn existing_links(&self, links: &[&str]) -> Result<HashSet<String>, StoreError> {
        let mut found = HashSet::new();
        for link in links {
            if self.exists_by_link(link).await? {
                found.insert(link.to_string());
            }
        }
        Ok(found)
    }

    /// One page of articles, newest first. Pages are 1-based; page 0 is
    /// treated as page 1.
    async fn list_articles(&self, page: u32, page_size: u32) -> Result<Vec<Article>, StoreError>;

    async fn count_articles(&self) -> Result<i64, StoreError>;
}

pub(crate) fn page_offset(page: u32, page_size: u32) -> i64 {
    i64::from(page.max(1) - 1) * i64::from(page_size)
}

/// In-process store with the same semantics as the SQLite one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: RwLock<Vec<Article>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Article> {
        self.articles.read().await.clone()
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn commit(&self, batch: &[CandidateItem]) -> Result<CommitOutcome, StoreError> {
        let mut articles = self.articles.write().await;
        let mut links: HashSet<String> = articles.iter().map(|a| a.link.clone()).collect();
        let mut next_id = articles.last().map(|a| a.id).unwrap_or(0) + 1;
        let mut outcome = CommitOutcome::default();

        for item in batch {
            if !links.insert(item.link.clone()) {
                outcome.skipped += 1;
                continue;
            }
            articles.push(Article {
                id: next_id,
                title: item.title.clone(),
                summary: item.summary.clone(),
                published_at: item.published_at,
                link: item.link.clone(),
                category: item.category.clone(),
            });
            next_id += 1;
            outcome.inserted += 1;
        }

        Ok(outcome)
    }

    async fn exists_by_link(&self, link: &str) -> Result<bool, StoreError> {
        Ok(self.articles.read().await.iter().any(|a| a.link == link))
    }

    async fn list_articles(&self, page: u32, page_size: u32) -> Result<Vec<Article>, StoreError> {
        let mut articles = self.articles.read().await.clone();
        articles.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let offset = page_offset(page, page_size) as usize;
        Ok(articles
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect())
    }

    async fn count_articles(&self) -> Result<i64, StoreError> {
        Ok(self.articles.read().await.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(link: &str, hour: u32) -> CandidateItem {
        CandidateItem {
            title: format!("Title {}", link),
            summary: None,
            published_at: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            link: link.to_string(),
            category: "space".to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_and_list_newest_first() {
        let store = MemoryStore::new();
        let outcome = store
            .commit(&[item("https://a", 9), item("https://b", 11), item("https://c", 10)])
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome { inserted: 3, skipped: 0 });

        let links: Vec<_> = store
            .list_articles(1, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.link)
            .collect();
        assert_eq!(links, vec!["https://b", "https://c", "https://a"]);
    }

    #[tokio::test]
    async fn test_commit_skips_colliding_links() {
        let store = MemoryStore::new();
        store.commit(&[item("https://a", 9)]).await.unwrap();

        let outcome = store
            .commit(&[item("https://a", 12), item("https://b", 10), item("https://b", 8)])
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome { inserted: 1, skipped: 2 });
        assert_eq!(store.count_articles().await.unwrap(), 2);
        // The original row is untouched
        let a = store.all().await.into_iter().find(|a| a.link == "https://a").unwrap();
        assert_eq!(a.published_at.format("%H").to_string(), "09");
    }

    #[tokio::test]
    async fn test_existing_links_default_impl() {
        let store = MemoryStore::new();
        store.commit(&[item("https://a", 9), item("https://b", 9)]).await.unwrap();

        let found = store
            .existing_links(&["https://a", "https://z"])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains("https://a"));
        assert!(store.exists_by_link("https://b").await.unwrap());
        assert!(!store.exists_by_link("https://z").await.unwrap());
    }

    #[tokio::test]
    async fn test_pagination() {
        let store = MemoryStore::new();
        let batch: Vec<_> = (0..7).map(|h| item(&format!("https://{}", h), h)).collect();
        store.commit(&batch).await.unwrap();

        assert_eq!(store.list_articles(1, 3).await.unwrap().len(), 3);
        assert_eq!(store.list_articles(3, 3).await.unwrap().len(), 1);
        assert!(store.list_articles(4, 3).await.unwrap().is_empty());
        // Page 0 behaves like page 1
        assert_eq!(
            store.list_articles(0, 3).await.unwrap(),
            store.list_articles(1, 3).await.unwrap()
        );
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(0, 50), 0);
        assert_eq!(page_offset(1, 50), 0);
        assert_eq!(page_offset(3, 50), 100);
    }
}
