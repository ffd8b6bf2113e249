//! ConsoleSession - line-oriented driver over a process's standard streams.

use crate::command::ConsoleCommand;
use crate::error::{ConsoleError, Result};
use crate::prompt::{OutputBuffer, PromptMatcher, Scan};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

/// Size of a single read from the console output.
const READ_CHUNK: usize = 4096;

type ConsoleWriter = Box<dyn AsyncWrite + Send + Unpin>;
type ConsoleReader = Box<dyn AsyncRead + Send + Unpin>;

/// Owns the input, output and error streams of one console process.
///
/// Writes go to the input stream one statement per line. Output is read
/// on demand by [`await_prompt`](Self::await_prompt); the error stream is
/// drained in the background into `debug` events so the child never
/// blocks on a full pipe.
pub struct ConsoleSession {
    input: Option<ConsoleWriter>,
    output: Option<ConsoleReader>,
    errors: Option<JoinHandle<()>>,
    buffer: OutputBuffer,
}

impl ConsoleSession {
    /// Wrap an input and an output stream.
    pub fn new<W, R>(input: W, output: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            input: Some(Box::new(input)),
            output: Some(Box::new(output)),
            errors: None,
            buffer: OutputBuffer::new(),
        }
    }

    /// Attach the error stream, draining it on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_errors<E>(mut self, errors: E) -> Self
    where
        E: AsyncRead + Send + Unpin + 'static,
    {
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(errors).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => tracing::debug!(line = %line, "console stderr"),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::trace!(error = %e, "console stderr read failed");
                        break;
                    }
                }
            }
        });
        self.errors = Some(task);
        self
    }

    /// Write `text` followed by a newline and flush.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::BrokenPipe`] if the process closed its input,
    /// [`ConsoleError::Closed`] if this session was closed.
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        let input = self.input.as_mut().ok_or(ConsoleError::Closed)?;
        tracing::debug!(line = %text, "console <<");
        input
            .write_all(text.as_bytes())
            .await
            .map_err(ConsoleError::from_write)?;
        input.write_all(b"\n").await.map_err(ConsoleError::from_write)?;
        input.flush().await.map_err(ConsoleError::from_write)?;
        Ok(())
    }

    /// Send a console statement.
    pub async fn send(&mut self, command: ConsoleCommand) -> Result<()> {
        self.send_line(command.as_str()).await
    }

    /// Wait until the output contains a prompt for the matcher's node.
    ///
    /// Output up to and including the prompt is consumed, so a second call
    /// waits for a fresh prompt. Arbitrary output may precede the prompt.
    ///
    /// # Errors
    ///
    /// - [`ConsoleError::PromptTimeout`] if no prompt appears within `timeout`
    /// - [`ConsoleError::Crashed`] if the VM reports a fatal boot error
    /// - [`ConsoleError::Exited`] if the output stream ends first
    pub async fn await_prompt(&mut self, matcher: &PromptMatcher, timeout: Duration) -> Result<()> {
        let output = self.output.as_mut().ok_or(ConsoleError::Closed)?;
        let buffer = &mut self.buffer;
        let start = std::time::Instant::now();

        let wait = async {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match matcher.scan(buffer.as_str()) {
                    Scan::Prompt { end } => {
                        buffer.consume(end);
                        return Ok(());
                    }
                    Scan::Crashed(line) => return Err(ConsoleError::Crashed(line)),
                    Scan::Pending => {}
                }

                let n = output.read(&mut chunk).await?;
                if n == 0 {
                    return Err(ConsoleError::Exited);
                }
                tracing::trace!(
                    output = %String::from_utf8_lossy(&chunk[..n]),
                    "console >>"
                );
                buffer.push(&chunk[..n]);
            }
        };

        let result = tokio::time::timeout(timeout, wait).await;
        match result {
            Ok(Ok(())) => {
                tracing::debug!(
                    node = %matcher.node(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Console prompt seen"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(
                    node = %matcher.node(),
                    timeout_ms = timeout.as_millis() as u64,
                    buffered = self.buffer.len(),
                    "Console prompt timeout"
                );
                Err(ConsoleError::PromptTimeout(timeout))
            }
        }
    }

    /// Drop buffered output and any output that is ready to read right now.
    ///
    /// Called before a statement is sent so that a prompt printed for an
    /// earlier line cannot answer the new one. Never waits for more output.
    /// Returns the number of bytes dropped.
    pub async fn discard_pending(&mut self) -> usize {
        let mut dropped = self.buffer.len();
        self.buffer.consume(dropped);
        let Some(output) = self.output.as_mut() else {
            return dropped;
        };
        let mut chunk = [0u8; READ_CHUNK];
        // a zero timeout still polls the read once before expiring
        while let Ok(Ok(n)) = tokio::time::timeout(Duration::ZERO, output.read(&mut chunk)).await {
            if n == 0 {
                break;
            }
            tracing::trace!(
                output = %String::from_utf8_lossy(&chunk[..n]),
                "console >> (discarded)"
            );
            dropped += n;
        }
        if dropped > 0 {
            tracing::debug!(bytes = dropped, "Discarded stale console output");
        }
        dropped
    }

    /// Close the input stream only, signalling end of input to the process.
    pub fn close_input(&mut self) {
        self.input.take();
    }

    /// Read and discard output until the stream ends.
    pub async fn drain(&mut self) {
        let Some(output) = self.output.as_mut() else {
            return;
        };
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match output.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => tracing::trace!(
                    output = %String::from_utf8_lossy(&chunk[..n]),
                    "console >> (draining)"
                ),
                Err(_) => break,
            }
        }
    }

    /// Close all streams. Safe to call more than once.
    pub fn close(&mut self) {
        self.input.take();
        self.output.take();
        if let Some(task) = self.errors.take() {
            task.abort();
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.input.is_none() && self.output.is_none()
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        self.close();
    }
}
