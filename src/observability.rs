use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: calendar reconciliation passes completed.
pub const RECONCILE_TOTAL: &str = "stayd_reconcile_total";

/// Histogram: reconciliation pass latency in seconds.
pub const RECONCILE_DURATION_SECONDS: &str = "stayd_reconcile_duration_seconds";

/// Counter: booking writes rejected by the overlap check.
pub const BOOKING_CONFLICTS_TOTAL: &str = "stayd_booking_conflicts_total";

/// Counter: scheduled sync passes that failed (download or reconcile).
pub const SYNC_FAILURES_TOTAL: &str = "stayd_sync_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of active companies (loaded engines).
pub const COMPANIES_ACTIVE: &str = "stayd_companies_active";

/// Histogram: WAL flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "stayd_wal_flush_duration_seconds";

/// Histogram: WAL flush batch size (events per fsync).
pub const WAL_FLUSH_BATCH_SIZE: &str = "stayd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
