use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::SiteConfig;
use crate::scheduler::StatusHandle;
use crate::store::{Article, ArticleStore};

const ARTICLES_PER_PAGE: u32 = 50;

/// Pages listed in the sitemap.
const SITEMAP_PAGES: &[&str] = &["/", "/home"];

pub struct AppState {
    pub store: Arc<dyn ArticleStore>,
    pub status: StatusHandle,
    pub site: SiteConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/home", get(index))
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/robots.txt", get(robots))
        .route("/sitemap.xml", get(sitemap))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Template structs
#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub title: String,
    pub articles: Vec<ArticleView>,
    pub page: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

#[derive(Template)]
#[template(path = "sitemap.xml")]
pub struct SitemapTemplate {
    pub base_url: String,
    pub pages: Vec<String>,
}

pub struct ArticleView {
    pub title: String,
    pub link: String,
    pub domain: String,
    pub summary: Option<String>,
    pub category: String,
    pub published: String,
}

impl From<Article> for ArticleView {
    fn from(article: Article) -> Self {
        Self {
            domain: link_domain(&article.link),
            published: article.published_at.format("%m-%d-%Y").to_string(),
            title: article.title,
            link: article.link,
            summary: article.summary,
            category: article.category,
        }
    }
}

/// Host of `link` without a leading `www.`; empty if the link doesn't parse.
pub fn link_domain(link: &str) -> String {
    reqwest::Url::parse(link)
        .ok()
        .and_then(|url| {
            url.host_str()
                .map(|h| h.strip_prefix("www.").unwrap_or(h).to_string())
        })
        .unwrap_or_default()
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: u32,
}

fn first_page() -> u32 {
    1
}

// Route handlers
pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.page.max(1);
    let articles = state.store.list_articles(page, ARTICLES_PER_PAGE).await?;
    let total = state.store.count_articles().await?;
    let has_more = i64::from(page) * i64::from(ARTICLES_PER_PAGE) < total;

    Ok(HtmlTemplate(HomeTemplate {
        title: state.site.title.clone(),
        articles: articles.into_iter().map(ArticleView::from).collect(),
        page,
        prev_page: (page > 1).then(|| page - 1),
        next_page: has_more.then(|| page + 1),
    }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.status.snapshot().await)
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

pub async fn robots(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!(
            "User-Agent: *\nDisallow: /\n\nSitemap: https://{}/sitemap.xml",
            state.site.domain
        ),
    )
}

pub async fn sitemap(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let xml = SitemapTemplate {
        base_url: format!("https://{}", state.site.domain),
        pages: SITEMAP_PAGES.iter().map(|p| p.to_string()).collect(),
    }
    .render()?;

    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::CandidateItem;
    use crate::scheduler::Scheduler;
    use crate::store::MemoryStore;
    use crate::{classifier::Classifier, fetcher::Fetcher};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    struct NoDocuments;

    #[async_trait::async_trait]
    impl crate::fetcher::FeedClient for NoDocuments {
        async fn fetch_document(&self, url: &str) -> Result<Vec<u8>, crate::error::FetchError> {
            Err(crate::error::FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn create_test_app(store: Arc<MemoryStore>) -> Router {
        let fetcher = Arc::new(Fetcher::new(Arc::new(NoDocuments), 1, Duration::ZERO));
        let scheduler = Scheduler::new(
            Vec::new(),
            Classifier::default(),
            fetcher,
            store.clone(),
            Duration::from_secs(60),
        );

        router(Arc::new(AppState {
            store,
            status: scheduler.status(),
            site: SiteConfig::default(),
        }))
    }

    async fn setup_articles(store: &MemoryStore, count: u32) {
        let batch: Vec<_> = (1..=count)
            .map(|i| CandidateItem {
                title: format!("Article {}", i),
                summary: Some(format!("Summary {}", i)),
                published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::hours(i64::from(i)),
                link: format!("https://www.article{}.com/post", i),
                category: "space".to_string(),
            })
            .collect();
        store.commit(&batch).await.unwrap();
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let app = create_test_app(Arc::new(MemoryStore::new()));
            let (status, body) = get_body(app, "/health").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "OK");
        }
    }

    mod index_tests {
        use super::*;

        #[tokio::test]
        async fn test_index_empty_store() {
            let app = create_test_app(Arc::new(MemoryStore::new()));
            let (status, body) = get_body(app, "/").await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("Megafeed"));
        }

        #[tokio::test]
        async fn test_index_lists_newest_first() {
            let store = Arc::new(MemoryStore::new());
            setup_articles(&store, 3).await;

            let (status, body) = get_body(create_test_app(store), "/").await;
            assert_eq!(status, StatusCode::OK);

            let third = body.find("Article 3").unwrap();
            let first = body.find("Article 1").unwrap();
            assert!(third < first);
            assert!(body.contains("article1.com"));
            assert!(!body.contains("www.article1.com</"));
        }

        #[tokio::test]
        async fn test_index_paginates() {
            let store = Arc::new(MemoryStore::new());
            setup_articles(&store, 60).await;

            let (_, first) = get_body(create_test_app(store.clone()), "/").await;
            assert!(first.contains("Article 60"));
            assert!(first.contains("?page=2"));

            let (status, second) = get_body(create_test_app(store), "/home?page=2").await;
            assert_eq!(status, StatusCode::OK);
            assert!(second.contains("Article 10<"));
            assert!(!second.contains("Article 60"));
            assert!(!second.contains("?page=3"));
            assert!(second.contains("?page=1"));
        }

        #[tokio::test]
        async fn test_index_bad_page_param() {
            let app = create_test_app(Arc::new(MemoryStore::new()));
            let (status, _) = get_body(app, "/?page=abc").await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    mod status_tests {
        use super::*;

        #[tokio::test]
        async fn test_status_reports_idle() {
            let app = create_test_app(Arc::new(MemoryStore::new()));
            let (status, body) = get_body(app, "/status").await;
            assert_eq!(status, StatusCode::OK);

            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(json["state"], "idle");
            assert_eq!(json["cycles_completed"], 0);
            assert!(json["last_report"].is_null());
        }
    }

    mod crawler_files_tests {
        use super::*;

        #[tokio::test]
        async fn test_robots_points_at_sitemap() {
            let app = create_test_app(Arc::new(MemoryStore::new()));
            let (status, body) = get_body(app, "/robots.txt").await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("Disallow: /"));
            assert!(body.contains("Sitemap: https://megafeed.co/sitemap.xml"));
        }

        #[tokio::test]
        async fn test_sitemap_lists_pages() {
            let app = create_test_app(Arc::new(MemoryStore::new()));
            let (status, body) = get_body(app, "/sitemap.xml").await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("<loc>https://megafeed.co/home</loc>"));
        }
    }

    #[test]
    fn test_link_domain() {
        assert_eq!(link_domain("https://www.nasa.gov/rss/x"), "nasa.gov");
        assert_eq!(link_domain("https://spacenews.com/feed/"), "spacenews.com");
        assert_eq!(link_domain("not a url"), "");
        assert_eq!(link_domain("https://www.www.example.com/a"), "www.example.com");
    }
}
