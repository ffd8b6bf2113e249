//! Statements understood by the Erlang shell of a Riak node.

use std::fmt;

/// A control statement sent to the console.
///
/// Erlang shell statements are terminated by a full stop; the console
/// evaluates a statement once it receives the line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Blank line. Some shells only print their first prompt after input.
    Kick,
    /// Shut the node down.
    Stop,
    /// Wipe all data held by the in-memory KV test backend.
    ResetKv,
    /// Wipe all data held by the in-memory search test backend.
    ResetSearch,
    /// Restart every application in the node without leaving the VM.
    Restart,
}

impl ConsoleCommand {
    /// The statement text, without line terminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleCommand::Kick => "",
            ConsoleCommand::Stop => "init:stop().",
            ConsoleCommand::ResetKv => "riak_kv_test_backend:reset().",
            ConsoleCommand::ResetSearch => "riak_search_test_backend:reset().",
            ConsoleCommand::Restart => "init:restart().",
        }
    }
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleCommand::Kick => write!(f, "<kick>"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_terminated() {
        for cmd in [
            ConsoleCommand::Stop,
            ConsoleCommand::ResetKv,
            ConsoleCommand::ResetSearch,
            ConsoleCommand::Restart,
        ] {
            assert!(cmd.as_str().ends_with(")."), "{cmd} must end with a full stop");
        }
        assert_eq!(ConsoleCommand::Kick.as_str(), "");
    }

    #[test]
    fn test_display() {
        assert_eq!(ConsoleCommand::Stop.to_string(), "init:stop().");
        assert_eq!(ConsoleCommand::Kick.to_string(), "<kick>");
    }
}
