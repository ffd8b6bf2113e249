//! Error types for riakbox-console.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for riakbox-console operations.
pub type Result<T> = std::result::Result<T, ConsoleError>;

/// Errors that can occur while driving a console process.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Failed to launch the console process
    #[error("failed to spawn console process: {0}")]
    Spawn(String),

    /// The process closed its input stream
    #[error("console input closed (broken pipe)")]
    BrokenPipe,

    /// No prompt appeared before the deadline
    #[error("no console prompt after {0:?}")]
    PromptTimeout(Duration),

    /// The output stream ended before a prompt appeared
    #[error("console process exited before prompting")]
    Exited,

    /// The Erlang VM reported a fatal boot error
    #[error("console process crashed: {0}")]
    Crashed(String),

    /// The session was already closed
    #[error("console session is closed")]
    Closed,

    /// The prompt pattern could not be compiled
    #[error("invalid prompt pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConsoleError {
    /// Check if this error means the process on the other end is gone.
    pub fn is_process_gone(&self) -> bool {
        matches!(
            self,
            ConsoleError::BrokenPipe | ConsoleError::Exited | ConsoleError::Closed
        )
    }

    /// Map a write error, folding pipe closure into [`ConsoleError::BrokenPipe`].
    pub(crate) fn from_write(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
                ConsoleError::BrokenPipe
            }
            _ => ConsoleError::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_gone() {
        assert!(ConsoleError::BrokenPipe.is_process_gone());
        assert!(ConsoleError::Exited.is_process_gone());
        assert!(ConsoleError::Closed.is_process_gone());
        assert!(!ConsoleError::PromptTimeout(Duration::from_secs(1)).is_process_gone());
        assert!(!ConsoleError::Crashed("boom".into()).is_process_gone());
    }

    #[test]
    fn test_write_error_mapping() {
        let err = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert!(matches!(ConsoleError::from_write(err), ConsoleError::BrokenPipe));

        let err = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(ConsoleError::from_write(err), ConsoleError::Io(_)));
    }
}
