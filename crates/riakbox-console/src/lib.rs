//! # riakbox-console
//!
//! Drives the interactive Erlang console of a Riak node over its standard
//! streams.
//!
//! ## Quick Start
//!
//! ```no_run
//! use riakbox_console::{ConsoleCommand, ServerHandle};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # async fn example() -> riakbox_console::Result<()> {
//! let mut server = ServerHandle::spawn(Path::new("/tmp/riak/bin/riak"), "dev1@127.0.0.1")?;
//!
//! // Some shells only prompt after their first input line
//! server.send(ConsoleCommand::Kick).await?;
//! server.await_prompt(Duration::from_secs(30)).await?;
//!
//! // Reset the in-memory backend and wait for the shell to come back
//! server
//!     .execute(ConsoleCommand::ResetKv, Duration::from_secs(10))
//!     .await?;
//!
//! server.send(ConsoleCommand::Stop).await?;
//! let _ = server.shutdown(Duration::from_secs(10)).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Prompt Detection**: `(<node>)<n>> ` matched anywhere in buffered output
//! - **Crash Detection**: fails fast on `Kernel pid terminated`
//! - **Broken Pipe Mapping**: writes to a dead process surface as one error kind
//! - **Deferred Reaping**: stopping never blocks on a slow-exiting process

mod command;
mod error;
mod handle;
mod prompt;
mod session;

pub use command::ConsoleCommand;
pub use error::{ConsoleError, Result};
pub use handle::{ServerHandle, CONSOLE_ARG};
pub use prompt::{OutputBuffer, PromptMatcher, Scan, CRASH_MARKER};
pub use session::ConsoleSession;
