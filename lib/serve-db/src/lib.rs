//! Hot-reloadable routing store for the log collector
//!
//! This library provides:
//! - Parsing and validation of serve files
//! - A concurrent routing table keyed by (identity, socket path)
//! - Crash-safe persistence of accepted serve files
//! - Rejection of invalid serve files with a diagnostic
//! - The poll state machine tying these together

pub mod db;
pub mod error;
pub mod layout;
pub mod persist;
pub mod record;
pub mod reject;
pub mod table;

pub use db::{PollOutcome, ServeDb};
pub use error::{Result, ServeDbError, ValidationError};
pub use layout::StoreLayout;
pub use record::{parse, ServeKey, ServeRecord};
pub use table::{RoutingTable, ServeTable};
