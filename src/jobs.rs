//! Background jobs, one set per company engine: the daily-ish calendar sync
//! and the WAL compactor. The serving path never waits on either.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::engine::Engine;

/// Seam for feed download so sync logic is testable without a network.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Periodic calendar sync for one company. Each tick walks every calendar
/// source that has a URL and reconciles it.
pub async fn run_calendar_sync(
    engine: Arc<Engine>,
    fetcher: Arc<dyn FeedFetcher>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        sync_once(&engine, fetcher.as_ref()).await;
    }
}

/// One sync pass. Every source fails independently: a dead feed is logged
/// and skipped, it never blocks the others. Returns the number of sources
/// that synced successfully.
pub async fn sync_once(engine: &Engine, fetcher: &dyn FeedFetcher) -> usize {
    let sources = engine.list_syncable_sources().await;
    let mut synced = 0;

    for source in sources {
        let Some(url) = source.url.as_deref() else {
            continue;
        };
        let feed = match fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(source = %source.source_name, unit = %source.unit_id, error = %e, "feed download failed");
                metrics::counter!(crate::observability::SYNC_FAILURES_TOTAL).increment(1);
                continue;
            }
        };

        match engine
            .reconcile_feed(&feed, source.unit_id, &source.source_name)
            .await
        {
            Ok(outcome) => {
                let now = chrono::Utc::now().naive_utc();
                if let Err(e) = engine.mark_source_synced(source.id, now).await {
                    warn!(source = %source.source_name, error = %e, "could not stamp sync time");
                }
                info!(
                    source = %source.source_name,
                    unit = %source.unit_id,
                    added = outcome.added,
                    updated = outcome.updated,
                    cancelled = outcome.cancelled,
                    "calendar synced"
                );
                synced += 1;
            }
            Err(e) => {
                warn!(source = %source.source_name, unit = %source.unit_id, error = %e, "reconciliation failed");
                metrics::counter!(crate::observability::SYNC_FAILURES_TOTAL).increment(1);
            }
        }
    }

    synced
}

/// Periodic WAL compaction once the log has grown past the threshold.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        ticker.tick().await;
        if engine.wal_appends_since_compact().await >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("WAL compacted"),
                Err(e) => warn!(error = %e, "WAL compaction failed"),
            }
        }
    }
}
