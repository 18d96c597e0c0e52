//! Reload driver: polls the serve database on a fixed cadence

use crate::metrics::CollectorMetrics;
use crate::supervisor::Supervisor;
use anyhow::{Context, Result};
use serve_db::{PollOutcome, ServeDb};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Run one poll on a blocking thread, handing the database back afterwards
pub async fn poll_once(mut db: ServeDb) -> Result<(ServeDb, PollOutcome)> {
    let (db, result) = tokio::task::spawn_blocking(move || {
        let result = db.poll();
        (db, result)
    })
    .await
    .context("serve database poll task panicked")?;

    let outcome = result.with_context(|| {
        format!("serve database poll failed in {}", db.layout().root().display())
    })?;
    Ok((db, outcome))
}

/// Poll forever. Returns only when a poll fails.
pub async fn run(
    mut db: ServeDb,
    interval: Duration,
    metrics: Arc<CollectorMetrics>,
    mut supervisor: Supervisor,
) -> Result<()> {
    let table = db.table();
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut first = true;

    loop {
        ticker.tick().await;

        let (returned, outcome) = poll_once(db).await?;
        db = returned;
        metrics.record_poll(&outcome, table.len());

        match &outcome {
            PollOutcome::Unchanged => debug!("Serve database unchanged"),
            PollOutcome::Installed { records } => info!(records, "Serve database reloaded"),
            PollOutcome::Rejected { reason } => {
                warn!(reason = %reason, "Serve file rejected, keeping current routes")
            }
        }

        // The first poll may have recovered a table from disk.
        if first || matches!(outcome, PollOutcome::Installed { .. }) {
            supervisor.reconcile();
            debug!(workers = supervisor.len(), "Syslog workers running");
            first = false;
        }
    }
}
