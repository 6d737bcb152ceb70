//! The polling loop.
//!
//! One feed per tick, strictly sequential: pick the least recently fetched
//! feed, claim it, fetch it, ingest its items. The claim is written before
//! any network I/O, so a feed that hangs or fails still moves to the back of
//! the queue and cannot starve the others.

mod ingest;

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::feed::{FetchError, Fetcher};
use crate::storage::{DatabaseError, Feed, FeedStore};

pub use ingest::{ingest_document, ingest_item, IngestError, IngestOutcome, IngestTally, SkipReason};

/// Failures that stop [`Scheduler::run_forever`].
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("polling interval must be greater than zero")]
    ZeroInterval,
    /// The very first cycle could not reach the store
    #[error("feed store unavailable: {0}")]
    StoreUnavailable(#[source] DatabaseError),
}

/// Identity of the feed a cycle worked on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRef {
    pub id: i64,
    pub name: String,
    pub url: String,
}

impl From<&Feed> for FeedRef {
    fn from(feed: &Feed) -> Self {
        Self {
            id: feed.id,
            name: feed.name.clone(),
            url: feed.url.clone(),
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// No feeds in the store
    Idle,
    /// Claimed but the fetch failed; nothing was ingested
    FetchFailed(FetchError),
    Ingested(IngestTally),
}

/// What one polling cycle did.
#[derive(Debug)]
pub struct CycleReport {
    /// `None` for idle cycles
    pub feed: Option<FeedRef>,
    pub outcome: CycleOutcome,
}

pub struct Scheduler {
    store: Arc<dyn FeedStore>,
    fetcher: Fetcher,
    reports: Option<mpsc::Sender<CycleReport>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn FeedStore>, fetcher: Fetcher) -> Self {
        Self {
            store,
            fetcher,
            reports: None,
        }
    }

    /// Forward every cycle's report to `tx`.
    pub fn with_reports(mut self, tx: mpsc::Sender<CycleReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Runs a single polling cycle.
    ///
    /// Fetch failures and per-item problems are part of the returned report.
    ///
    /// # Errors
    ///
    /// Only store failures while selecting or claiming the feed. Nothing has
    /// been fetched when this returns an error.
    pub async fn poll_once(&self) -> Result<CycleReport, DatabaseError> {
        let Some(feed) = self.store.least_recently_fetched_feed().await? else {
            tracing::debug!("No feeds to fetch");
            return Ok(CycleReport {
                feed: None,
                outcome: CycleOutcome::Idle,
            });
        };

        self.store.claim_feed(feed.id, Utc::now()).await?;
        tracing::info!(feed = %feed.url, name = %feed.name, "Fetching feed");

        let outcome = match self.fetcher.fetch(&feed.url).await {
            Ok(document) => {
                let tally = ingest_document(self.store.as_ref(), feed.id, &document).await;
                tracing::info!(
                    feed = %feed.url,
                    items = document.items.len(),
                    created = tally.created.len(),
                    skipped = tally.skipped,
                    failed = tally.failed,
                    "Ingested feed"
                );
                CycleOutcome::Ingested(tally)
            }
            Err(e) => {
                tracing::warn!(feed = %feed.url, error = %e, "Failed to fetch feed");
                CycleOutcome::FetchFailed(e)
            }
        };

        Ok(CycleReport {
            feed: Some(FeedRef::from(&feed)),
            outcome,
        })
    }

    /// Polls one feed every `interval` until `shutdown` resolves.
    ///
    /// The first cycle runs immediately. Ticking is fixed-rate: a cycle that
    /// overruns is followed by the next one straight away, without a burst
    /// of missed ticks. `shutdown` is only observed between cycles, so an
    /// in-flight fetch finishes (or times out) first.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::ZeroInterval`] for a zero `interval`
    /// - [`SchedulerError::StoreUnavailable`] if the first cycle cannot reach
    ///   the store; later store failures are logged and retried next tick
    pub async fn run_forever<F>(&self, interval: Duration, shutdown: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()>,
    {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(interval = ?interval, "Scheduler started");
        let mut first_cycle = true;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping scheduler");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.poll_once().await {
                Ok(report) => self.publish(report).await,
                Err(e) if first_cycle => return Err(SchedulerError::StoreUnavailable(e)),
                Err(e) => {
                    tracing::warn!(error = %e, "Polling cycle failed, retrying next tick");
                }
            }
            first_cycle = false;
        }
    }

    async fn publish(&self, report: CycleReport) {
        if let Some(tx) = &self.reports {
            if tx.send(report).await.is_err() {
                tracing::debug!("Cycle report receiver dropped");
            }
        }
    }
}
