//! Readiness probing for a node's HTTP listener.

use crate::error::{CoreError, Result};
use crate::value::ConfigMap;
use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Time allowed for a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between connection attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Host and port a node serves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAddr {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServiceAddr {
    /// Create an address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Read `riak_core.web_ip` and `riak_core.web_port`.
    ///
    /// Returns `None` if either is missing or the port is out of range.
    pub fn from_app_config(config: &ConfigMap) -> Option<Self> {
        let host = config.get_path(&["riak_core", "web_ip"])?.as_str()?;
        let port = config.get_path(&["riak_core", "web_port"])?.as_int()?;
        let port = u16::try_from(port).ok().filter(|p| *p != 0)?;
        Some(Self::new(host, port))
    }
}

impl fmt::Display for ServiceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Waits until a service accepts connections.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Wait until `addr` is ready, for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Timeout`] if the service is not ready in time.
    async fn wait_for_service(&self, addr: &ServiceAddr, timeout: Duration) -> Result<()>;
}

/// Probe that retries a TCP connect until it succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn wait_for_service(&self, addr: &ServiceAddr, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let target = (addr.host.as_str(), addr.port);
        let mut attempts: u32 = 0;

        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis() as u64,
            "Waiting for service"
        );

        loop {
            attempts += 1;
            let remaining = timeout.saturating_sub(start.elapsed());
            let attempt = CONNECT_TIMEOUT.min(remaining);

            match tokio::time::timeout(attempt, TcpStream::connect(target)).await {
                Ok(Ok(_stream)) => {
                    tracing::info!(
                        addr = %addr,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Service accepting connections"
                    );
                    return Ok(());
                }
                Ok(Err(e)) => {
                    tracing::trace!(addr = %addr, attempt = attempts, error = %e, "Connect failed");
                }
                Err(_) => {
                    tracing::trace!(addr = %addr, attempt = attempts, "Connect attempt timed out");
                }
            }

            if start.elapsed() + RETRY_INTERVAL >= timeout {
                tracing::warn!(
                    addr = %addr,
                    attempts,
                    timeout_ms = timeout.as_millis() as u64,
                    "Service not ready"
                );
                return Err(CoreError::Timeout {
                    what: "service",
                    after: timeout,
                });
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ConfigValue;
    use tokio::net::TcpListener;

    #[test]
    fn test_addr_from_app_config() {
        let config = ConfigMap::new().with(
            "riak_core",
            ConfigMap::new().with("web_ip", "127.0.0.1").with("web_port", 8098),
        );
        assert_eq!(
            ServiceAddr::from_app_config(&config),
            Some(ServiceAddr::new("127.0.0.1", 8098))
        );
    }

    #[test]
    fn test_addr_rejects_bad_port() {
        for port in [ConfigValue::Int(0), ConfigValue::Int(70000), ConfigValue::from("80")] {
            let config = ConfigMap::new().with(
                "riak_core",
                ConfigMap::new().with("web_ip", "127.0.0.1").with("web_port", port),
            );
            assert!(ServiceAddr::from_app_config(&config).is_none());
        }
    }

    #[tokio::test]
    async fn test_tcp_probe_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        TcpProbe
            .wait_for_service(&ServiceAddr::new("127.0.0.1", port), Duration::from_secs(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tcp_probe_waits_for_listener() {
        // Reserve a port, release it, then bind it again after a delay.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            let _ = listener.accept().await;
        });

        TcpProbe
            .wait_for_service(&ServiceAddr::new("127.0.0.1", port), Duration::from_secs(5))
            .await
            .unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn test_tcp_probe_timeout() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = TcpProbe
            .wait_for_service(&ServiceAddr::new("127.0.0.1", port), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
