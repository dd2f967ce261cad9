//! Offline recovery: connectivity watching and the retry schedule.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

use crate::storage::RetryConfig;

/// How often `wait_for_online` re-checks connectivity.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Cap for a single TCP probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Timings of the network-failure retry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on waiting for connectivity to return.
    pub online_wait: Duration,
    /// Pause before the final attempt.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            online_wait: Duration::from_secs(20),
            retry_delay: Duration::from_secs(3),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            online_wait: Duration::from_secs(cfg.online_wait_secs),
            retry_delay: Duration::from_secs(cfg.retry_delay_secs),
        }
    }
}

/// Reports whether the device can reach the network.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;

    /// Resolve `true` as soon as connectivity is observed, `false` once
    /// `limit` elapses without it.
    async fn wait_for_online(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.is_online().await {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

/// Always online. For hosts without a connectivity signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Considers the device online when a TCP connection to the API host opens.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            addr: format!("{}:{}", host.into(), port),
        }
    }

    /// Probe the host of an API base URL. `None` if the URL has no host.
    pub fn for_base_url(base_url: &str) -> Option<Self> {
        let url = url::Url::parse(base_url.trim()).ok()?;
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some(Self::new(host, port))
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_online(&self) -> bool {
        matches!(
            timeout(PROBE_TIMEOUT, TcpStream::connect(&self.addr)).await,
            Ok(Ok(_))
        )
    }
}
