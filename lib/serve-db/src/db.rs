//! The serve database: one reload attempt per [`ServeDb::poll`]
//!
//! An external program renames a candidate file into `serves.new`. On the
//! next poll the candidate is validated. A valid candidate is copied to
//! `serves.loaded`, the staging file is removed along with any earlier
//! `serves.rej` and `last_error`, and the new table is installed. An invalid
//! candidate is renamed to `serves.rej` with its cause written to
//! `last_error`, and the current table stays in effect.
//!
//! The copy-on-accept, rename-on-reject split lets other programs tell from
//! `stat()` alone whether a submission was taken.

use crate::error::{Result, ServeDbError};
use crate::layout::StoreLayout;
use crate::record::{self, ServeKey, ServeRecord};
use crate::table::RoutingTable;
use crate::{persist, reject};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Whether the loaded file has been recovered into memory yet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PollState {
    /// No poll has completed since the process started
    Cold,
    /// The loaded file, if any, is reflected in memory
    Warm,
}

/// What a successful poll did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// No staging file was present
    Unchanged,
    /// A staging file was accepted and installed
    Installed { records: usize },
    /// A staging file was refused and recorded as `serves.rej`
    Rejected { reason: String },
}

/// Routing store backed by a directory
#[derive(Debug)]
pub struct ServeDb {
    layout: StoreLayout,
    table: Arc<RoutingTable>,
    state: PollState,
}

impl ServeDb {
    /// Open a store rooted at `root`. Nothing is read until the first poll.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: StoreLayout::new(root),
            table: Arc::new(RoutingTable::new()),
            state: PollState::Cold,
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Shared handle for readers that outlive a borrow of the store
    pub fn table(&self) -> Arc<RoutingTable> {
        self.table.clone()
    }

    pub fn lookup(&self, key: &ServeKey) -> Option<Arc<ServeRecord>> {
        self.table.lookup(key)
    }

    pub fn is_warm(&self) -> bool {
        self.state == PollState::Warm
    }

    /// Poll for new routing information to load.
    ///
    /// Rejections are not errors. An `Err` means the store could not make
    /// progress and the caller should stop.
    pub fn poll(&mut self) -> Result<PollOutcome> {
        if self.state == PollState::Cold {
            self.recover()?;
            self.state = PollState::Warm;
        }

        let staging = self.layout.staging_path();
        let contents = match fs::read(&staging) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No staging serve file");
                return Ok(PollOutcome::Unchanged);
            }
            Err(e) => return Err(ServeDbError::io(staging, e)),
        };

        let table = match record::parse(&contents) {
            Ok(table) => table,
            Err(cause) => {
                if let Err(e) = reject::reject(&self.layout, &cause) {
                    error!(error = %e, cause = %cause, "Failed to record rejected serve file");
                    return Err(ServeDbError::nested(e, cause.into()));
                }
                return Ok(PollOutcome::Rejected {
                    reason: cause.to_string(),
                });
            }
        };

        // Disk first, so a crash never leaves memory ahead of it.
        persist::persist_loaded(&self.layout, &contents)?;
        reject::clear(&self.layout);

        let records = table.len();
        self.table.install(table);
        info!(records, "Installed new serve file");

        Ok(PollOutcome::Installed { records })
    }

    /// Load `serves.loaded` left behind by an earlier process
    fn recover(&self) -> Result<()> {
        let loaded = self.layout.loaded_path();
        let contents = match fs::read(&loaded) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(root = %self.layout.root().display(), "No loaded serve file, starting empty");
                return Ok(());
            }
            Err(e) => return Err(ServeDbError::io(loaded, e)),
        };

        // The loaded file was accepted once; failing to parse it now is fatal.
        let table = record::parse(&contents).map_err(|source| ServeDbError::CorruptLoaded {
            path: loaded.clone(),
            source,
        })?;

        let records = table.len();
        self.table.install(table);
        info!(records, path = %loaded.display(), "Recovered loaded serve file");
        Ok(())
    }
}
