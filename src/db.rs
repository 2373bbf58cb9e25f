use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::StoreError;
use crate::fetcher::CandidateItem;
use crate::store::{page_offset, Article, ArticleStore, CommitOutcome};

/// Links per `IN (...)` lookup, well under SQLite's bind limit.
const LINK_CHUNK: usize = 500;

#[derive(Debug, Clone, FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    summary: Option<String>,
    published: String,
    link: String,
    category: String,
}

impl TryFrom<ArticleRow> for Article {
    type Error = StoreError;

    fn try_from(row: ArticleRow) -> Result<Self, Self::Error> {
        let published_at = DateTime::parse_from_rfc3339(&row.published)
            .map_err(|e| StoreError::CorruptRow {
                id: row.id,
                message: format!("bad published '{}': {}", row.published, e),
            })?
            .with_timezone(&Utc);

        Ok(Article {
            id: row.id,
            title: row.title,
            summary: row.summary,
            published_at,
            link: row.link,
            category: row.category,
        })
    }
}

/// Fixed-width UTC text, so lexical order matches chronological order.
/// Only holds for years 0000-9999; `CandidateItem::from_raw` rejects the rest.
fn format_published(published: DateTime<Utc>) -> String {
    published.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                summary TEXT,
                published TEXT NOT NULL,
                link TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_articles_published
            ON articles(published DESC, id DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ArticleStore for Database {
    async fn commit(&self, batch: &[CandidateItem]) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut outcome = CommitOutcome::default();

        for item in batch {
            let result = sqlx::query(
                r#"
                INSERT INTO articles (title, summary, published, link, category)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(link) DO NOTHING
                "#,
            )
            .bind(&item.title)
            .bind(&item.summary)
            .bind(format_published(item.published_at))
            .bind(&item.link)
            .bind(&item.category)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                outcome.skipped += 1;
            } else {
                outcome.inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn exists_by_link(&self, link: &str) -> Result<bool, StoreError> {
        let found: (i64,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM articles WHERE link = ?)")
            .bind(link)
            .fetch_one(&self.pool)
            .await?;
        Ok(found.0 != 0)
    }

    async fn existing_links(&self, links: &[&str]) -> Result<HashSet<String>, StoreError> {
        let mut found = HashSet::new();

        for chunk in links.chunks(LINK_CHUNK) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT link FROM articles WHERE link IN (");
            let mut separated = query.separated(", ");
            for link in chunk {
                separated.push_bind(*link);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String,)> = query.build_query_as().fetch_all(&self.pool).await?;
            found.extend(rows.into_iter().map(|(link,)| link));
        }

        Ok(found)
    }

    async fn list_articles(&self, page: u32, page_size: u32) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, title, summary, published, link, category FROM articles
            ORDER BY published DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(i64::from(page_size))
        .bind(page_offset(page, page_size))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Article::try_from).collect()
    }

    async fn count_articles(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
