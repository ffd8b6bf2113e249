//! Error types for riakbox-core.

use riakbox_console::ConsoleError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for riakbox-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while provisioning or driving a test server.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Sandbox files could not be written, or the launcher template read
    #[error("failed to write {}: {source}", path.display())]
    ConfigWrite {
        /// File or directory involved
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The server process could not be launched
    #[error("failed to spawn test server: {0}")]
    Spawn(String),

    /// A prompt or readiness wait ran out of time
    #[error("{what} not ready after {after:?}")]
    Timeout {
        /// What was being waited for
        what: &'static str,
        /// How long we waited
        after: Duration,
    },

    /// Console protocol failure
    #[error("console error: {0}")]
    Console(#[source] ConsoleError),

    /// Options failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Check if this error means the server process is gone.
    pub fn is_process_gone(&self) -> bool {
        matches!(self, CoreError::Console(e) if e.is_process_gone())
    }

    /// Check if this error reports a VM crash.
    pub fn is_crash(&self) -> bool {
        matches!(self, CoreError::Console(ConsoleError::Crashed(_)))
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout { .. })
    }

    pub(crate) fn config_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::ConfigWrite {
            path: path.into(),
            source,
        }
    }
}

impl From<ConsoleError> for CoreError {
    fn from(err: ConsoleError) -> Self {
        match err {
            ConsoleError::PromptTimeout(after) => CoreError::Timeout {
                what: "console prompt",
                after,
            },
            ConsoleError::Spawn(msg) => CoreError::Spawn(msg),
            other => CoreError::Console(other),
        }
    }
}
