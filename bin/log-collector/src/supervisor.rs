//! Keeps one syslog worker running per routed socket path

use crate::worker::{self, WorkerSettings};
use serve_db::{RoutingTable, ServeRecord, ServeTable};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

struct RunningWorker {
    record: Arc<ServeRecord>,
    // Dropping the sender stops the worker.
    _stop: oneshot::Sender<()>,
}

/// Workers to stop and start to match a routing table
#[derive(Debug, Default, PartialEq)]
pub struct Plan {
    pub stop: Vec<String>,
    pub start: Vec<Arc<ServeRecord>>,
}

/// Compare running workers, keyed by socket path, against `table`.
///
/// A socket path carries one identity. If a table routes several identities
/// through the same path, the lowest identity wins.
pub fn plan(running: &HashMap<String, Arc<ServeRecord>>, table: &ServeTable) -> Plan {
    let mut wanted: BTreeMap<&str, &Arc<ServeRecord>> = BTreeMap::new();
    for record in table.records() {
        match wanted.get(record.path()) {
            Some(existing) if existing.identity() <= record.identity() => {
                warn!(
                    path = %record.path(),
                    kept = %existing.identity(),
                    ignored = %record.identity(),
                    "Socket path routed for more than one identity"
                );
            }
            _ => {
                wanted.insert(record.path(), record);
            }
        }
    }

    let mut plan = Plan::default();
    for (path, current) in running {
        match wanted.get(path.as_str()) {
            Some(record) if **record == *current => {}
            _ => plan.stop.push(path.clone()),
        }
    }
    plan.stop.sort();

    for (path, record) in wanted {
        let unchanged = running.get(path).is_some_and(|current| **current == **record);
        if !unchanged {
            plan.start.push((*record).clone());
        }
    }

    plan
}

pub struct Supervisor {
    table: Arc<RoutingTable>,
    settings: Arc<WorkerSettings>,
    fatal: mpsc::UnboundedSender<anyhow::Error>,
    workers: HashMap<String, RunningWorker>,
}

impl Supervisor {
    pub fn new(
        table: Arc<RoutingTable>,
        settings: Arc<WorkerSettings>,
        fatal: mpsc::UnboundedSender<anyhow::Error>,
    ) -> Self {
        Self {
            table,
            settings,
            fatal,
            workers: HashMap::new(),
        }
    }

    /// Number of running workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Bring workers in line with the currently installed table
    pub fn reconcile(&mut self) {
        let snapshot = self.table.snapshot();
        let running = self
            .workers
            .iter()
            .map(|(path, worker)| (path.clone(), worker.record.clone()))
            .collect();
        let plan = plan(&running, &snapshot);

        for path in &plan.stop {
            self.workers.remove(path);
        }
        for record in &plan.start {
            self.spawn(record.clone());
        }

        if !plan.stop.is_empty() || !plan.start.is_empty() {
            info!(
                stopped = plan.stop.len(),
                started = plan.start.len(),
                running = self.workers.len(),
                "Reconciled syslog workers"
            );
        }
    }

    fn spawn(&mut self, record: Arc<ServeRecord>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let key = record.key().clone();
        let table = self.table.clone();
        let settings = self.settings.clone();
        let fatal = self.fatal.clone();

        tokio::task::spawn(async move {
            if let Err(e) = worker::run(key, table, settings, stop_rx).await {
                error!("Syslog worker failed: {:#}", e);
                let _ = fatal.send(e);
            }
        });

        self.workers.insert(
            record.path().to_string(),
            RunningWorker {
                record,
                _stop: stop_tx,
            },
        );
    }
}
