use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission decisions. Labels: op, outcome.
pub const ADMISSIONS_TOTAL: &str = "ocupa_admissions_total";

/// Histogram: mutation latency in seconds. Labels: op.
pub const MUTATION_DURATION_SECONDS: &str = "ocupa_mutation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: spaces currently registered.
pub const SPACES_ACTIVE: &str = "ocupa_spaces_active";

/// Counter: pending reservations auto-rejected by the reaper.
pub const STALE_PENDING_REAPED_TOTAL: &str = "ocupa_stale_pending_reaped_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "ocupa_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "ocupa_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
/// Process-level setup for the embedding binary; the library itself only
/// records metrics and works fine without an exporter installed.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install a fmt tracing subscriber. For the embedding binary; the engine
/// itself only emits events.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Map a rejection to a short outcome label for metrics.
pub fn outcome_label(result: &Result<(), &EngineError>) -> &'static str {
    match result {
        Ok(()) => "admitted",
        Err(EngineError::NotFound(_)) => "not_found",
        Err(EngineError::AlreadyExists(_)) => "already_exists",
        Err(EngineError::InvalidInput(_)) => "invalid_input",
        Err(EngineError::Forbidden(_)) => "forbidden",
        Err(EngineError::Conflict(_)) => "conflict",
        Err(EngineError::CapacityExceeded { .. }) => "capacity_exceeded",
        Err(EngineError::HasReservations(_)) => "has_reservations",
        Err(EngineError::LimitExceeded(_)) => "limit_exceeded",
        Err(EngineError::WalError(_)) => "wal_error",
    }
}
