use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogplexError>;

#[derive(Error, Debug)]
pub enum LogplexError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Logplex rejected batch of {messages} messages with status {status}")]
    Status { status: u16, messages: usize },
}
