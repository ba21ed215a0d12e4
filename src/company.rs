use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::engine::Engine;
use crate::jobs::{self, FeedFetcher};
use crate::limits::*;

/// Manages per-company engines. Each company gets its own Engine + WAL +
/// background jobs, so tenant isolation is structural: an engine can only
/// ever see its own company's units and bookings.
pub struct CompanyManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    sync_interval: Duration,
    fetcher: Arc<dyn FeedFetcher>,
}

impl CompanyManager {
    pub fn new(
        data_dir: PathBuf,
        compact_threshold: u64,
        sync_interval: Duration,
        fetcher: Arc<dyn FeedFetcher>,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            sync_interval,
            fetcher,
        }
    }

    /// Get or lazily create the engine for a company.
    pub fn get_or_create(&self, company: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(company) {
            return Ok(engine.value().clone());
        }
        if company.len() > MAX_COMPANY_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "company name too long",
            ));
        }
        if self.engines.len() >= MAX_COMPANIES {
            return Err(std::io::Error::other("too many companies"));
        }

        // Sanitize the company name to prevent path traversal.
        let safe_name: String = company
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty company name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::new(wal_path)?);

        // Spawn the sync job + compactor for this company.
        let sync_engine = engine.clone();
        let fetcher = self.fetcher.clone();
        let interval = self.sync_interval;
        tokio::spawn(async move {
            jobs::run_calendar_sync(sync_engine, fetcher, interval).await;
        });
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            jobs::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(company.to_string(), engine.clone());
        metrics::gauge!(crate::observability::COMPANIES_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    /// Engines already loaded, for sweep-style callers.
    pub fn loaded(&self) -> Vec<(String, Arc<Engine>)> {
        self.engines
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
