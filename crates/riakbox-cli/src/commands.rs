//! Interactive commands read from the harness's stdin.

use riakbox_core::TestServer;
use std::fmt;
use std::str::FromStr;

/// One line of harness input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Wipe the node's data.
    Recycle,
    /// Start the node if it is not running.
    Start,
    /// Stop the node, keeping the sandbox.
    Stop,
    /// Print the node's state.
    Status,
    /// List commands.
    Help,
    /// Clean up and exit.
    Quit,
}

/// Input that is not a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command `{0}` (try `help`)")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "recycle" | "r" => Ok(Command::Recycle),
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "status" | "s" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Recycle => "recycle",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Status => "status",
            Command::Help => "help",
            Command::Quit => "quit",
        };
        f.write_str(name)
    }
}

/// Text printed for `help`.
pub const HELP: &str = "commands: recycle (r), start, stop, status (s), help, quit (q)";

/// Run a command against the server and describe the outcome.
///
/// `Quit` is left to the caller.
pub async fn execute(server: &TestServer, command: Command) -> String {
    match command {
        Command::Recycle => match server.recycle().await {
            Ok(true) => "recycled".to_string(),
            Ok(false) => format!("server not running ({})", server.state()),
            Err(e) => format!("recycle failed: {e}"),
        },
        Command::Start => match server.start().await {
            Ok(true) => format!("started {}", status_line(server)),
            Ok(false) => format!("not started ({})", server.state()),
            Err(e) => format!("start failed: {e}"),
        },
        Command::Stop => {
            if server.stop().await {
                "stopped".to_string()
            } else {
                format!("not running ({})", server.state())
            }
        }
        Command::Status => status_line(server),
        Command::Help | Command::Quit => HELP.to_string(),
    }
}

/// One-line summary of the server.
pub fn status_line(server: &TestServer) -> String {
    let mut line = format!("{} {}", server.node_name(), server.state());
    if let Some(pid) = server.pid() {
        line.push_str(&format!(" pid={pid}"));
    }
    if let Some(at) = server.started_at() {
        line.push_str(&format!(" since={}", at.to_rfc3339()));
    }
    line
}
