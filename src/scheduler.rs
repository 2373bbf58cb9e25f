//! The ingestion loop.
//!
//! One cycle fetches every configured source, classifies and normalizes the
//! entries, deduplicates the whole batch and commits the survivors in a single
//! store operation. Nothing is written before that commit, so a cycle can be
//! abandoned at any point without leaving partial results behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::classifier::Classifier;
use crate::config::{Config, FeedConfig};
use crate::dedup;
use crate::error::CycleError;
use crate::fetcher::{CandidateItem, Fetcher};
use crate::store::ArticleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Fetching,
    Committing,
    Sleeping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources_total: usize,
    pub failed_sources: Vec<String>,
    pub entries_seen: usize,
    pub malformed: usize,
    pub in_cycle_duplicates: usize,
    pub already_stored: usize,
    pub inserted: u64,
    /// Rows the store refused at commit time because of a link collision
    pub skipped: u64,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>, sources_total: usize) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            sources_total,
            failed_sources: Vec::new(),
            entries_seen: 0,
            malformed: 0,
            in_cycle_duplicates: 0,
            already_stored: 0,
            inserted: 0,
            skipped: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: CycleState,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

/// Read-only view of the scheduler, shared with the serving layer.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<SchedulerStatus>>,
}

impl StatusHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SchedulerStatus {
                state: CycleState::Idle,
                cycles_completed: 0,
                cycles_failed: 0,
                last_report: None,
                last_error: None,
                last_finished_at: None,
            })),
        }
    }

    pub async fn snapshot(&self) -> SchedulerStatus {
        self.inner.read().await.clone()
    }

    pub async fn state(&self) -> CycleState {
        self.inner.read().await.state
    }

    async fn set_state(&self, state: CycleState) {
        self.inner.write().await.state = state;
    }

    async fn record(&self, result: &Result<CycleReport, CycleError>) {
        let mut status = self.inner.write().await;
        status.state = CycleState::Idle;
        status.last_finished_at = Some(Utc::now());
        match result {
            Ok(report) => {
                status.cycles_completed += 1;
                status.last_report = Some(report.clone());
                status.last_error = None;
            }
            Err(e) => {
                status.cycles_failed += 1;
                status.last_error = Some(e.to_string());
            }
        }
    }
}

pub struct Scheduler {
    sources: Vec<FeedConfig>,
    classifier: Classifier,
    fetcher: Arc<Fetcher>,
    store: Arc<dyn ArticleStore>,
    delay: Duration,
    concurrency: usize,
    require_summary: bool,
    cycle_guard: Mutex<()>,
    status: StatusHandle,
}

impl Scheduler {
    pub fn new(
        sources: Vec<FeedConfig>,
        classifier: Classifier,
        fetcher: Arc<Fetcher>,
        store: Arc<dyn ArticleStore>,
        delay: Duration,
    ) -> Self {
        Self {
            sources,
            classifier,
            fetcher,
            store,
            delay,
            concurrency: 1,
            require_summary: false,
            cycle_guard: Mutex::new(()),
            status: StatusHandle::new(),
        }
    }

    pub fn from_config(config: &Config, fetcher: Arc<Fetcher>, store: Arc<dyn ArticleStore>) -> Self {
        Self::new(
            config.feeds.clone(),
            Classifier::from_config(&config.categories),
            fetcher,
            store,
            config.refresh_delay(),
        )
        .with_concurrency(config.fetch.concurrency)
        .with_require_summary(config.fetch.require_summary)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_require_summary(mut self, require_summary: bool) -> Self {
        self.require_summary = require_summary;
        self
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Run one cycle. Refused if another cycle is still in progress.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let _guard = self
            .cycle_guard
            .try_lock()
            .map_err(|_| CycleError::AlreadyRunning)?;

        let result = self.ingest().await;
        self.status.record(&result).await;
        result
    }

    async fn ingest(&self) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::new(Utc::now(), self.sources.len());
        self.status.set_state(CycleState::Fetching).await;
        info!("Fetching {} feeds", self.sources.len());

        // buffered() yields in source order, so the first copy of an
        // in-cycle duplicate is always the same one
        let fetched: Vec<_> = stream::iter(self.sources.iter().cloned())
            .map(|source| {
                let fetcher = self.fetcher.clone();
                async move {
                    let result = fetcher.fetch_entries(&source.url).await;
                    (source, result)
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut candidates = Vec::new();
        for (source, result) in fetched {
            let entries = match result {
                Ok(entries) => entries,
                Err(e) => {
                    error!(
                        "Skipping feed '{}' this cycle after {} attempts: {}",
                        source.display_name(),
                        self.fetcher.max_attempts(),
                        e
                    );
                    report.failed_sources.push(source.url);
                    continue;
                }
            };

            let category = self.classifier.classify(&source.url);
            for raw in entries {
                report.entries_seen += 1;
                match CandidateItem::from_raw(raw, category, self.require_summary) {
                    Ok(item) => candidates.push(item),
                    Err(e) => {
                        report.malformed += 1;
                        debug!("Dropping entry from '{}': {}", source.display_name(), e);
                    }
                }
            }
        }

        let outcome = dedup::deduplicate(candidates, self.store.as_ref()).await?;
        report.in_cycle_duplicates = outcome.in_cycle_duplicates;
        report.already_stored = outcome.already_stored;

        let mut batch = outcome.survivors;
        batch.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        self.status.set_state(CycleState::Committing).await;
        let committed = self.store.commit(&batch).await?;
        report.inserted = committed.inserted;
        report.skipped = committed.skipped;
        report.finished_at = Utc::now();

        info!(
            "Cycle complete: {} new articles ({} already stored, {} duplicates, {} malformed, {}/{} feeds failed)",
            report.inserted,
            report.already_stored,
            report.in_cycle_duplicates,
            report.malformed,
            report.failed_sources.len(),
            report.sources_total
        );
        Ok(report)
    }

    /// Run cycles back to back, sleeping the configured delay after each,
    /// until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting ingestion loop: {} feeds every {} minutes",
            self.sources.len(),
            self.delay.as_secs() / 60
        );

        while !*shutdown.borrow() {
            tokio::select! {
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        error!("Ingestion cycle failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("Shutdown requested, abandoning in-flight cycle");
                    break;
                }
            }

            self.status.set_state(CycleState::Sleeping).await;
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = shutdown.changed() => break,
            }
            self.status.set_state(CycleState::Idle).await;
        }

        self.status.set_state(CycleState::Idle).await;
        info!("Ingestion loop stopped");
    }
}
