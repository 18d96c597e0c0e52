//! Client for the logplex HTTP drain
//!
//! Messages are buffered as octet-counted syslog lines and posted in
//! batches, authenticated with the token of the serve record they belong to.

pub mod client;
pub mod error;
pub mod frame;

pub use client::{LogplexClient, LogplexConfig};
pub use error::{LogplexError, Result};
pub use frame::frame_message;
