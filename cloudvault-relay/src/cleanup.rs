//! Background cleanup: prune finished and expired pairing requests.

use chrono::{Duration as ChronoDuration, Utc};
use cloudvault_core::{PairingStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

pub fn spawn_cleanup_task(store: Arc<SqliteStore>, retention_hours: u64) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(3600)); // hourly
        loop {
            interval.tick().await;
            if let Err(e) = run_cleanup(store.as_ref(), retention_hours).await {
                tracing::error!("Cleanup error: {}", e);
            }
        }
    });
}

async fn run_cleanup<S: PairingStore>(store: &S, retention_hours: u64) -> cloudvault_core::Result<u64> {
    let retention = ChronoDuration::hours(retention_hours.min(i64::MAX as u64 / 3600) as i64);
    let pruned = store.prune_pairings(Utc::now() - retention).await?;
    tracing::debug!(pruned, "Cleanup completed");
    Ok(pruned)
}
