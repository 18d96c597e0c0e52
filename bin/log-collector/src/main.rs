use anyhow::{Context, Result};
use serve_db::ServeDb;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod admin;
mod config;
mod metrics;
mod reload;
mod supervisor;
mod worker;

use config::{CollectorConfig, LogFormat};
use metrics::CollectorMetrics;
use supervisor::Supervisor;
use worker::WorkerSettings;

#[tokio::main]
async fn main() -> Result<()> {
    let config = CollectorConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting log-collector...");
    info!("  - Serve database: {}", config.serve_db_dir.display());
    info!("  - Poll interval: {:?}", config.poll_interval);
    info!("  - Logplex: {}", config.logplex_url);

    let metrics = Arc::new(CollectorMetrics::new().context("Failed to create metrics collector")?);

    let db = ServeDb::new(&config.serve_db_dir);
    let settings = Arc::new(WorkerSettings {
        http: reqwest::Client::new(),
        logplex_url: config.logplex_url.clone(),
        hostname: config.hostname.clone(),
        max_batch: config.max_batch,
        flush_interval: config.flush_interval,
        metrics: metrics.clone(),
    });

    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let supervisor = Supervisor::new(db.table(), settings, fatal_tx);

    if let Some(addr) = config.admin_addr {
        let metrics = metrics.clone();
        tokio::task::spawn(async move {
            if let Err(e) = admin::serve(addr, metrics).await {
                error!("Admin server failed: {:#}", e);
            }
        });
    } else {
        info!("Admin server disabled");
    }

    // Any failure below ends the process; a restart recovers from disk.
    tokio::select! {
        result = reload::run(db, config.poll_interval, metrics, supervisor) => {
            result.context("exiting, serve database reload failed")
        }
        Some(e) = fatal_rx.recv() => {
            Err(e.context("exiting, syslog worker failed"))
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("cannot listen for shutdown signal")?;
            info!("Shutting down");
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
