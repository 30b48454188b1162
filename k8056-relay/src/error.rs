//! Common error types for k8056-relay.
//!
//! This module provides a centralized Error enum using thiserror, with
//! conversions from the transport errors the bus driver can run into.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for bus operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Relay number outside 1..=9. Raised before any bus I/O.
    #[error("invalid relay number {0} (expected 1-9)")]
    InvalidRelay(u32),

    /// The open/transmit/close sequence did not finish in time
    #[error("bus session timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failed to open, write, or close
    #[error("channel error: {0}")]
    Channel(#[from] io::Error),

    /// Endpoint string could not be parsed
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_serial::Error> for Error {
    fn from(e: tokio_serial::Error) -> Self {
        Error::Channel(e.into())
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
