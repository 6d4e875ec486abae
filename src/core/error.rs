use std::io;
use thiserror::Error;

/// Custom error types for the schedule synchronization protocol
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Sequence number error: {0}")]
    Sequence(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error("Capacity error: {0}")]
    Capacity(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new codec error
    pub fn codec(msg: impl Into<String>) -> Self {
        Error::Codec(msg.into())
    }

    /// Creates a new sequence number error
    pub fn sequence(msg: impl Into<String>) -> Self {
        Error::Sequence(msg.into())
    }

    /// Creates a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Creates a new schedule error
    pub fn schedule(msg: impl Into<String>) -> Self {
        Error::Schedule(msg.into())
    }

    /// Creates a new capacity error
    pub fn capacity(msg: impl Into<String>) -> Self {
        Error::Capacity(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
