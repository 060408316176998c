//! Console error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Console errors.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] algol_protocol::ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("unable to accept connection: {0}")]
    Accept(std::io::Error),

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("console already launched")]
    AlreadyLaunched,

    #[error("console is shut down")]
    ShutDown,

    #[error("connection {0} already started")]
    AlreadyStarted(u64),
}

impl ConsoleError {
    /// Returns whether the listening loop itself is broken.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConsoleError::Accept(_))
    }
}
