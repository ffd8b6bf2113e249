//! riakbox entry point.
//!
//! Boots one disposable Riak node in a private sandbox and keeps it running
//! until stdin closes, `quit` is entered or Ctrl-C is pressed. Each line on
//! stdin is a command (`recycle`, `start`, `stop`, `status`, `help`, `quit`);
//! results go to stdout, logs to stderr.

mod commands;
mod config;

use commands::{execute, status_line, Command, HELP};
use config::CliConfig;
use riakbox_core::TestServer;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command results
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("riakbox=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CliConfig::from_env();
    tracing::info!(?config, "Configuration loaded");
    config.validate_warn();

    let overrides = config.overrides()?;
    let options = config.server_options(&overrides)?;
    let server = TestServer::new(options).await;

    if let Err(e) = boot(&server).await {
        tracing::error!(error = %e, "Failed to bring up test server");
        server.cleanup().await;
        server.wait_for_shutdown().await;
        return Err(e.into());
    }
    println!("ready {}", status_line(&server));
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        tracing::info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read input");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => println!("{}", execute(&server, command).await),
                    Err(e) => println!("{e}"),
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                break;
            }
        }
    }

    tracing::info!("Cleaning up...");
    server.cleanup().await;
    server.wait_for_shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn boot(server: &TestServer) -> riakbox_core::Result<()> {
    server.prepare().await?;
    server.start().await?;
    Ok(())
}
