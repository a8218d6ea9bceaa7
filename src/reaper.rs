use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::Ms;

fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Ms
}

/// Background task that auto-rejects pending reservations once their
/// calendar day has fully passed — an approval nobody gave in time is a
/// rejection.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        for (reservation_id, space_id) in engine.collect_stale_pending(now_ms()) {
            match engine.reject_stale_pending(reservation_id).await {
                Ok(()) => {
                    metrics::counter!(crate::observability::STALE_PENDING_REAPED_TOTAL)
                        .increment(1);
                    info!("auto-rejected stale pending {reservation_id} on space {space_id}");
                }
                Err(e) => {
                    // May already have been decided or deleted
                    tracing::debug!("reaper skip {reservation_id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        if engine.wal_appends_since_compact().await >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("WAL compacted"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
