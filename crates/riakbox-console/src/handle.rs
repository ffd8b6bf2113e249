//! ServerHandle - a spawned console process and its session.

use crate::command::ConsoleCommand;
use crate::error::{ConsoleError, Result};
use crate::prompt::PromptMatcher;
use crate::session::ConsoleSession;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Argument that puts the launcher into interactive console mode.
pub const CONSOLE_ARG: &str = "console";

/// A live console process.
///
/// The child is spawned with `kill_on_drop`, so dropping a handle without
/// calling [`shutdown`](Self::shutdown) or [`kill`](Self::kill) still
/// terminates the process.
pub struct ServerHandle {
    child: Child,
    session: ConsoleSession,
    matcher: PromptMatcher,
    pid: Option<u32>,
}

impl ServerHandle {
    /// Launch `<script> console` with all three standard streams piped.
    ///
    /// # Arguments
    ///
    /// * `script` - Launcher script to execute
    /// * `node` - Node name the console prompt is parameterized with
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Spawn`] if the process cannot be started.
    pub fn spawn(script: &Path, node: &str) -> Result<Self> {
        let matcher = PromptMatcher::new(node)?;

        tracing::debug!(script = %script.display(), node = %node, "Spawning console process");
        let mut child = Command::new(script)
            .arg(CONSOLE_ARG)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!(script = %script.display(), error = %e, "Console spawn failed");
                ConsoleError::Spawn(format!("{}: {e}", script.display()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConsoleError::Spawn("stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConsoleError::Spawn("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConsoleError::Spawn("stderr not captured".into()))?;

        let pid = child.id();
        tracing::info!(pid, node = %node, "Console process started");

        Ok(Self {
            child,
            session: ConsoleSession::new(stdin, stdout).with_errors(stderr),
            matcher,
            pid,
        })
    }

    /// OS process id, if the process has not been reaped yet.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Node name the prompt matcher waits for.
    pub fn node(&self) -> &str {
        self.matcher.node()
    }

    /// The console session.
    pub fn session(&mut self) -> &mut ConsoleSession {
        &mut self.session
    }

    /// Send a console statement.
    pub async fn send(&mut self, command: ConsoleCommand) -> Result<()> {
        self.session.send(command).await
    }

    /// Wait for this node's prompt.
    pub async fn await_prompt(&mut self, timeout: Duration) -> Result<()> {
        self.session.await_prompt(&self.matcher, timeout).await
    }

    /// Send a statement and wait for the prompt that answers it.
    ///
    /// Output left over from earlier lines is discarded first, so a stale
    /// prompt cannot end the wait before the statement has run.
    pub async fn execute(&mut self, command: ConsoleCommand, timeout: Duration) -> Result<()> {
        self.session.discard_pending().await;
        self.send(command).await?;
        self.await_prompt(timeout).await
    }

    /// Consume one more prompt if it shows up within `window`.
    ///
    /// Returns whether a prompt was seen. Running out of time is not an
    /// error; the process exiting or crashing is.
    pub async fn settle(&mut self, window: Duration) -> Result<bool> {
        match self.await_prompt(window).await {
            Ok(()) => Ok(true),
            Err(ConsoleError::PromptTimeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Kill the process immediately and wait for it to exit.
    pub async fn kill(mut self) {
        self.session.close();
        if let Err(e) = self.child.kill().await {
            tracing::warn!(pid = self.pid, error = %e, "Failed to kill console process");
        }
    }

    /// Release the process without blocking on its exit.
    ///
    /// Input is closed right away. The returned task drains the remaining
    /// output, waits up to `grace` for the process to exit, then kills it.
    /// Dropping the task handle detaches it; the result is only observed by
    /// callers that await it.
    pub fn shutdown(self, grace: Duration) -> JoinHandle<Option<ExitStatus>> {
        let ServerHandle {
            mut child,
            mut session,
            pid,
            ..
        } = self;
        session.close_input();

        tokio::spawn(async move {
            let exited = tokio::time::timeout(grace, async {
                session.drain().await;
                child.wait().await
            })
            .await;
            session.close();

            match exited {
                Ok(Ok(status)) => {
                    tracing::debug!(pid, %status, "Console process exited");
                    Some(status)
                }
                Ok(Err(e)) => {
                    tracing::warn!(pid, error = %e, "Failed to reap console process");
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        pid,
                        grace_ms = grace.as_millis() as u64,
                        "Console process still running after grace period, killing"
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!(pid, error = %e, "Failed to kill console process");
                    }
                    None
                }
            }
        })
    }
}
