//! Buffered logplex client

use crate::error::{LogplexError, Result};
use crate::frame::frame_message;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

const CONTENT_TYPE: &str = "application/logplex-1";
const MSG_COUNT_HEADER: &str = "Logplex-Msg-Count";
const AUTH_USER: &str = "token";

/// Per-token client configuration
#[derive(Clone, Debug)]
pub struct LogplexConfig {
    /// Drain endpoint, e.g. `https://east.logplex.io/logs`
    pub url: String,
    /// Credential from the serve record
    pub token: String,
    /// Hostname written into each syslog line
    pub host: String,
    /// Buffered messages that trigger a flush
    pub max_batch: usize,
    /// Upper bound on one POST
    pub request_timeout: Duration,
}

impl Default for LogplexConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            host: "localhost".to_string(),
            max_batch: 100,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Client buffering messages for one token
pub struct LogplexClient {
    http: reqwest::Client,
    config: LogplexConfig,
    buffer: Vec<u8>,
    pending: usize,
}

impl LogplexClient {
    /// Create a client. `http` may be shared between clients.
    pub fn new(http: reqwest::Client, config: LogplexConfig) -> Self {
        Self {
            http,
            config,
            buffer: Vec::new(),
            pending: 0,
        }
    }

    /// Number of messages waiting for the next flush
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Buffer one message. Returns true once the batch is full.
    pub fn buffer_message(
        &mut self,
        priority: u8,
        time: DateTime<Utc>,
        procid: &str,
        msgid: &str,
        body: &[u8],
    ) -> bool {
        frame_message(
            &mut self.buffer,
            priority,
            time,
            &self.config.host,
            &self.config.token,
            procid,
            msgid,
            body,
        );
        self.pending += 1;
        self.pending >= self.config.max_batch
    }

    /// Post buffered messages.
    ///
    /// The buffer is emptied whether or not the post succeeds.
    pub async fn flush(&mut self) -> Result<usize> {
        if self.pending == 0 {
            return Ok(0);
        }

        let body = std::mem::take(&mut self.buffer);
        let messages = std::mem::replace(&mut self.pending, 0);

        let response = self
            .http
            .post(&self.config.url)
            .basic_auth(AUTH_USER, Some(&self.config.token))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(MSG_COUNT_HEADER, messages.to_string())
            .timeout(self.config.request_timeout)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LogplexError::Status {
                status: status.as_u16(),
                messages,
            });
        }

        debug!(messages, "Flushed logplex batch");
        Ok(messages)
    }
}
