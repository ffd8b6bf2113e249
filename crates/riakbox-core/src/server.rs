//! TestServer - lifecycle of one disposable Riak node.
//!
//! # Architecture
//!
//! A single async mutex guards the live [`ServerHandle`]. `start`, `stop`,
//! `recycle` and `cleanup` hold it for their whole duration, so lifecycle
//! changes are serialized per server. The current [`LifecycleState`], the
//! pid and the start time sit in atomics next to the lock and can be read
//! without waiting on it.
//!
//! Stopping never waits for the process to exit. The handle is handed to a
//! reaper task that gives the node its grace period and then kills it;
//! [`TestServer::wait_for_shutdown`] awaits the reapers when a caller needs
//! the processes gone.

use crate::error::{CoreError, Result};
use crate::materialize::ConfigMaterializer;
use crate::options::ServerOptions;
use crate::paths::SandboxPaths;
use crate::probe::{ReadinessProbe, TcpProbe};
use crate::recycle::RecyclePlan;
use crate::state::{LifecycleState, StateCell};
use chrono::{DateTime, Utc};
use riakbox_console::{ConsoleCommand, ServerHandle};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type Reaper = JoinHandle<Option<ExitStatus>>;

/// How long to wait for the console to answer the start-up blank line.
const KICK_ECHO_WAIT: Duration = Duration::from_millis(250);

/// A disposable Riak node backed by a private sandbox directory.
///
/// Dropping a `TestServer` kills a running node but leaves the sandbox on
/// disk; call [`cleanup`](Self::cleanup) at teardown.
pub struct TestServer {
    options: ServerOptions,
    paths: SandboxPaths,
    state: StateCell,
    /// The lifecycle lock. `Some` exactly while the state is `Started`.
    handle: Mutex<Option<ServerHandle>>,
    /// 0 when no process is running.
    pid: AtomicU32,
    /// Unix millis of the last successful start, 0 if never started.
    started_at: AtomicI64,
    reapers: Mutex<Vec<Reaper>>,
    probe: Arc<dyn ReadinessProbe>,
}

impl TestServer {
    /// Create a server that probes readiness over TCP.
    ///
    /// Removes anything left in the sandbox root by an earlier run.
    pub async fn new(options: ServerOptions) -> Self {
        Self::with_probe(options, Arc::new(TcpProbe)).await
    }

    /// Create a server with a custom readiness probe.
    ///
    /// Removes anything left in the sandbox root by an earlier run.
    pub async fn with_probe(options: ServerOptions, probe: Arc<dyn ReadinessProbe>) -> Self {
        let server = Self {
            paths: options.sandbox_paths(),
            options,
            state: StateCell::default(),
            handle: Mutex::new(None),
            pid: AtomicU32::new(0),
            started_at: AtomicI64::new(0),
            reapers: Mutex::new(Vec::new()),
            probe,
        };
        server.cleanup().await;
        server
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Options this server was created with.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Sandbox layout.
    pub fn paths(&self) -> &SandboxPaths {
        &self.paths
    }

    /// Node name from `-name`.
    pub fn node_name(&self) -> &str {
        self.options.node_name()
    }

    /// Current lifecycle state. Never blocks.
    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// Whether a node is running. Never blocks.
    pub fn is_started(&self) -> bool {
        self.state.get() == LifecycleState::Started
    }

    /// Pid of the running node.
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// When the node last finished starting.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.started_at.load(Ordering::Acquire) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create the sandbox and write the launcher and config files.
    ///
    /// Does nothing unless the server is `Unprepared`. Not serialized with
    /// the other lifecycle operations; call it once before sharing the
    /// server.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigWrite`] if the sandbox cannot be written
    /// or the launcher template cannot be read.
    pub async fn prepare(&self) -> Result<()> {
        if self.state.get() != LifecycleState::Unprepared {
            tracing::debug!(state = %self.state.get(), "Already prepared");
            return Ok(());
        }

        self.paths.create().await?;
        ConfigMaterializer::new(&self.options, &self.paths)
            .materialize()
            .await?;
        self.state.set(LifecycleState::Prepared);
        Ok(())
    }

    /// Launch the node and wait for its console prompt.
    ///
    /// Does nothing unless the server is `Prepared` or `Stopped`. Returns
    /// whether this call launched a process.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Spawn`] if the launcher cannot be executed
    /// - [`CoreError::Timeout`] if no prompt appears within the start timeout
    /// - [`CoreError::Console`] if the node crashes or exits while booting
    ///
    /// On error the process is killed and the server is left `Stopped`.
    pub async fn start(&self) -> Result<bool> {
        if !self.state.get().can_start() {
            tracing::debug!(state = %self.state.get(), "Start skipped");
            return Ok(false);
        }

        let mut slot = self.handle.lock().await;
        if !self.state.get().can_start() {
            tracing::debug!(state = %self.state.get(), "Start skipped");
            return Ok(false);
        }
        self.spawn_locked(&mut slot).await?;
        Ok(true)
    }

    /// Ask the node to shut down.
    ///
    /// Returns whether a running node was stopped. A node that already went
    /// away is still counted as stopped. Never fails.
    pub async fn stop(&self) -> bool {
        if !self.is_started() {
            return false;
        }
        let mut slot = self.handle.lock().await;
        self.stop_locked(&mut slot).await
    }

    /// Stop the node if running and delete the sandbox.
    ///
    /// Always ends `Unprepared`. Never fails; deletion problems are logged.
    pub async fn cleanup(&self) {
        let mut slot = self.handle.lock().await;
        self.stop_locked(&mut slot).await;

        match tokio::fs::remove_dir_all(&self.paths.root).await {
            Ok(()) => {
                tracing::info!(root = %self.paths.root.display(), "Sandbox removed");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    root = %self.paths.root.display(),
                    error = %e,
                    "Failed to remove sandbox"
                );
            }
        }
        self.state.set(LifecycleState::Unprepared);
    }

    /// Return the node to an empty data state.
    ///
    /// With the in-memory test backend the backends are reset from the
    /// console and the process keeps running. Otherwise the node restarts
    /// its applications and this call waits until the HTTP listener
    /// accepts connections again. A server that is not running is started
    /// instead.
    ///
    /// Returns `Ok(false)` if the node turned out to be gone; the server is
    /// then `Stopped` and may be started again.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Timeout`] if the prompt or the listener does not come
    ///   back in time; the node is left running
    /// - [`CoreError::Console`] if the node crashed; the server is `Stopped`
    /// - any error from [`start`](Self::start) when starting instead
    pub async fn recycle(&self) -> Result<bool> {
        let mut slot = self.handle.lock().await;

        let Some(handle) = slot.as_mut() else {
            if !self.state.get().can_start() {
                tracing::debug!(state = %self.state.get(), "Recycle skipped");
                return Ok(false);
            }
            tracing::debug!("Recycle on a stopped server, starting instead");
            self.spawn_locked(&mut slot).await?;
            return Ok(true);
        };

        let plan = RecyclePlan::for_config(self.options.app_config()).ok_or_else(|| {
            CoreError::InvalidConfig("no readiness target for a restarting recycle".into())
        })?;
        let prompt_timeout = self.options.prompt_timeout();
        let started = Instant::now();

        let result = async {
            match &plan {
                RecyclePlan::Reset(commands) => {
                    for command in commands {
                        handle.execute(*command, prompt_timeout).await?;
                    }
                }
                RecyclePlan::Restart(addr) => {
                    handle.execute(ConsoleCommand::Restart, prompt_timeout).await?;
                    self.probe
                        .wait_for_service(addr, self.options.restart_timeout())
                        .await?;
                }
            }
            Ok::<(), CoreError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    node = %self.node_name(),
                    fast = plan.is_fast(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Server recycled"
                );
                Ok(true)
            }
            Err(e) if e.is_process_gone() => {
                tracing::warn!(node = %self.node_name(), error = %e, "Server gone during recycle");
                self.release_locked(&mut slot).await;
                Ok(false)
            }
            Err(e) if e.is_crash() => {
                tracing::error!(
                    node = %self.node_name(),
                    error = %e,
                    "Server crashed during recycle"
                );
                self.release_locked(&mut slot).await;
                Err(e)
            }
            Err(e) => {
                tracing::warn!(node = %self.node_name(), error = %e, "Recycle failed");
                Err(e)
            }
        }
    }

    /// Wait for every stopped process to be reaped.
    pub async fn wait_for_shutdown(&self) {
        let reapers = std::mem::take(&mut *self.reapers.lock().await);
        if reapers.is_empty() {
            return;
        }
        tracing::debug!(count = reapers.len(), "Waiting for stopped processes");
        for reaper in reapers {
            match reaper.await {
                Ok(status) => tracing::debug!(?status, "Process reaped"),
                Err(e) => tracing::warn!(error = %e, "Reaper task failed"),
            }
        }
    }

    // ========================================================================
    // Internals (lifecycle lock held)
    // ========================================================================

    async fn spawn_locked(&self, slot: &mut Option<ServerHandle>) -> Result<()> {
        let started = Instant::now();
        let node = self.options.node_name();
        let mut handle = ServerHandle::spawn(&self.paths.launcher(), node)?;

        // A process that died before the kick still left its output to read.
        let booted = match handle.send(ConsoleCommand::Kick).await {
            Err(e) if !e.is_process_gone() => Err(e),
            _ => handle.await_prompt(self.options.start_timeout()).await,
        };
        // The blank line usually earns a second prompt of its own.
        let booted = match booted {
            Ok(()) => handle.settle(KICK_ECHO_WAIT).await.map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = booted {
            let err = CoreError::from(e);
            tracing::error!(node = %node, error = %err, "Server failed to start");
            handle.kill().await;
            self.pid.store(0, Ordering::Release);
            self.state.set(LifecycleState::Stopped);
            return Err(err);
        }

        let pid = handle.pid().unwrap_or(0);
        self.pid.store(pid, Ordering::Release);
        self.started_at
            .store(Utc::now().timestamp_millis(), Ordering::Release);
        *slot = Some(handle);
        self.state.set(LifecycleState::Started);

        tracing::info!(
            node = %node,
            pid,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Server started"
        );
        Ok(())
    }

    async fn stop_locked(&self, slot: &mut Option<ServerHandle>) -> bool {
        let Some(handle) = slot.as_mut() else {
            return false;
        };

        match handle.send(ConsoleCommand::Stop).await {
            Ok(()) => {}
            Err(e) if e.is_process_gone() => {
                tracing::debug!(node = %self.node_name(), "Server already gone at stop");
            }
            Err(e) => {
                tracing::warn!(node = %self.node_name(), error = %e, "Stop command failed");
            }
        }
        self.release_locked(slot).await;
        tracing::info!(node = %self.node_name(), "Server stopped");
        true
    }

    /// Hand the process to a reaper and mark the server stopped.
    async fn release_locked(&self, slot: &mut Option<ServerHandle>) {
        if let Some(handle) = slot.take() {
            let reaper = handle.shutdown(self.options.reap_grace());
            let mut reapers = self.reapers.lock().await;
            reapers.retain(|r| !r.is_finished());
            reapers.push(reaper);
        }
        self.pid.store(0, Ordering::Release);
        self.state.set(LifecycleState::Stopped);
    }
}

impl std::fmt::Debug for TestServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestServer")
            .field("node", &self.node_name())
            .field("root", &self.paths.root)
            .field("state", &self.state())
            .field("pid", &self.pid())
            .finish()
    }
}
