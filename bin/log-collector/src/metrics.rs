//! Prometheus metrics for the collector

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serve_db::PollOutcome;
use std::sync::Arc;

/// Collector metrics sharing one registry
#[derive(Clone)]
pub struct CollectorMetrics {
    /// Serve database polls by outcome
    pub polls_total: IntCounterVec,
    /// Serve files accepted and installed
    pub installs_total: IntCounter,
    /// Serve files rejected
    pub rejections_total: IntCounter,
    /// Records in the installed routing table
    pub records: IntGauge,
    /// Datagrams read from syslog sockets
    pub datagrams_total: IntCounter,
    /// Failed logplex batch posts
    pub flush_errors_total: IntCounter,
    pub registry: Arc<Registry>,
}

impl CollectorMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let polls_total = IntCounterVec::new(
            Opts::new("serve_db_polls_total", "Serve database polls by outcome"),
            &["outcome"],
        )?;
        let installs_total = IntCounter::new("serve_db_installs_total", "Serve files installed")?;
        let rejections_total =
            IntCounter::new("serve_db_rejections_total", "Serve files rejected")?;
        let records = IntGauge::new("serve_db_records", "Records in the routing table")?;
        let datagrams_total =
            IntCounter::new("syslog_datagrams_total", "Syslog datagrams received")?;
        let flush_errors_total =
            IntCounter::new("logplex_flush_errors_total", "Failed logplex batch posts")?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(installs_total.clone()))?;
        registry.register(Box::new(rejections_total.clone()))?;
        registry.register(Box::new(records.clone()))?;
        registry.register(Box::new(datagrams_total.clone()))?;
        registry.register(Box::new(flush_errors_total.clone()))?;

        Ok(Self {
            polls_total,
            installs_total,
            rejections_total,
            records,
            datagrams_total,
            flush_errors_total,
            registry,
        })
    }

    /// Count one completed poll
    pub fn record_poll(&self, outcome: &PollOutcome, records: usize) {
        let label = match outcome {
            PollOutcome::Unchanged => "unchanged",
            PollOutcome::Installed { .. } => {
                self.installs_total.inc();
                "installed"
            }
            PollOutcome::Rejected { .. } => {
                self.rejections_total.inc();
                "rejected"
            }
        };
        self.polls_total.with_label_values(&[label]).inc();
        self.records.set(records as i64);
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
