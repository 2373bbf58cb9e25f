use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use megafeed::config::Config;
use megafeed::db::Database;
use megafeed::fetcher::Fetcher;
use megafeed::routes::{self, AppState};
use megafeed::scheduler::Scheduler;
use megafeed::store::ArticleStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "megafeed=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("MEGAFEED_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} feeds and {} category rules from {}",
        config.feeds.len(),
        config.categories.len(),
        config_path
    );

    // Initialize database
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database_url.clone());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let store: Arc<dyn ArticleStore> = Arc::new(db);

    // Start ingestion loop
    let fetcher = Arc::new(Fetcher::from_config(&config.fetch)?);
    let scheduler = Arc::new(Scheduler::from_config(&config, fetcher, store.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingest = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let state = Arc::new(AppState {
        store,
        status: scheduler.status(),
        site: config.site.clone(),
    });
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Server starting on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    ingest.await?;
    Ok(())
}
