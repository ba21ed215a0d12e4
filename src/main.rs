use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use stayd::company::CompanyManager;
use stayd::jobs::HttpFetcher;

/// Sync daemon: loads every company found in the data directory and keeps
/// their calendar feeds reconciled until shut down.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("STAYD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    stayd::observability::init(metrics_port);

    let data_dir = std::env::var("STAYD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let sync_interval_secs: u64 = std::env::var("STAYD_SYNC_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(86_400); // once a day
    let compact_threshold: u64 = std::env::var("STAYD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    std::fs::create_dir_all(&data_dir)?;

    let manager = Arc::new(CompanyManager::new(
        PathBuf::from(&data_dir),
        compact_threshold,
        Duration::from_secs(sync_interval_secs),
        Arc::new(HttpFetcher::new()),
    ));

    // Every company with a WAL gets its engine (and sync jobs) started.
    let mut loaded = 0usize;
    for entry in std::fs::read_dir(&data_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("wal") {
            continue;
        }
        if let Some(company) = path.file_stem().and_then(|s| s.to_str()) {
            manager.get_or_create(company)?;
            loaded += 1;
        }
    }

    info!("stayd sync daemon started");
    info!("  data_dir: {data_dir}");
    info!("  companies: {loaded}");
    info!("  sync_interval: {sync_interval_secs}s");
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Run until SIGTERM/ctrl-c.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("stayd stopped");
    Ok(())
}
