//! Collector configuration from the environment

use anyhow::{anyhow, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;
const DEFAULT_MAX_BATCH: usize = 100;
const DEFAULT_ADMIN_ADDR: &str = "127.0.0.1:9090";

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format {:?}, expected \"text\" or \"json\"", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Serve database directory
    pub serve_db_dir: PathBuf,
    /// Logplex drain endpoint
    pub logplex_url: String,
    /// Hostname stamped on forwarded lines
    pub hostname: String,
    /// Time between serve database polls
    pub poll_interval: Duration,
    /// Period of the worker flush tick
    pub flush_interval: Duration,
    /// Buffered lines per upstream request
    pub max_batch: usize,
    /// Admin listener; `None` when disabled
    pub admin_addr: Option<SocketAddr>,
    pub log_format: LogFormat,
}

impl CollectorConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let serve_db_dir = lookup("SERVE_DB_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .context("SERVE_DB_DIR must be set")?;

        let logplex_url = lookup("LOGPLEX_URL")
            .filter(|v| !v.is_empty())
            .context("LOGPLEX_URL must be set")?;

        let hostname = lookup("HOSTNAME")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "localhost".to_string());

        let poll_interval = Duration::from_millis(parse_or(
            &lookup,
            "POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
        )?);
        let flush_interval = Duration::from_millis(parse_or(
            &lookup,
            "LOGPLEX_FLUSH_MS",
            DEFAULT_FLUSH_INTERVAL_MS,
        )?);
        let max_batch = parse_or(&lookup, "LOGPLEX_MAX_BATCH", DEFAULT_MAX_BATCH)?;

        if poll_interval.is_zero() {
            return Err(anyhow!("POLL_INTERVAL_MS must be greater than zero"));
        }
        if flush_interval.is_zero() {
            return Err(anyhow!("LOGPLEX_FLUSH_MS must be greater than zero"));
        }
        if max_batch == 0 {
            return Err(anyhow!("LOGPLEX_MAX_BATCH must be greater than zero"));
        }

        let admin_addr = match lookup("ADMIN_ADDR").as_deref() {
            Some("off") => None,
            Some(addr) => Some(
                addr.parse()
                    .with_context(|| format!("invalid ADMIN_ADDR {:?}", addr))?,
            ),
            None => Some(DEFAULT_ADMIN_ADDR.parse()?),
        };

        let log_format = match lookup("LOG_FORMAT") {
            Some(format) => format.parse().context("invalid LOG_FORMAT")?,
            None => LogFormat::Text,
        };

        Ok(Self {
            serve_db_dir,
            logplex_url,
            hostname,
            poll_interval,
            flush_interval,
            max_batch,
            admin_addr,
            log_format,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {} {:?}", name, value)),
        None => Ok(default),
    }
}
