//! Network monitor with connectivity checks and bring-up wait

use crate::config::NetworkConfig;
use anyhow::{anyhow, Result};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Link status as seen by the core
pub trait Connectivity: Send + Sync {
    /// Whether the device currently has a usable IPv4 address
    fn is_connected(&self) -> bool {
        self.local_ipv4().is_some()
    }

    /// The device's own IPv4 address, if any
    fn local_ipv4(&self) -> Option<Ipv4Addr>;
}

/// Discovers the local address by asking the OS which interface would route
/// to the probe address
pub struct NetworkMonitor {
    config: NetworkConfig,
}

impl NetworkMonitor {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    fn discover(&self) -> std::io::Result<Ipv4Addr> {
        // connect() on UDP only selects a route; nothing is sent
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(&self.config.probe_address)?;
        match socket.local_addr()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
            other => Err(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("no IPv4 route, got {}", other),
            )),
        }
    }

    /// Whether the wall clock looks synchronised
    pub fn is_clock_synchronized(&self) -> bool {
        clock_is_plausible(SystemTime::now(), self.config.min_valid_unix_secs)
    }

    /// Wait until the link is up and the clock is synchronised
    ///
    /// Fails once `setup_timeout` elapses; the caller treats that as fatal.
    pub async fn wait_until_ready(&self) -> Result<Ipv4Addr> {
        let deadline = Instant::now() + self.config.setup_timeout;
        let mut retry_delay = Duration::from_millis(250);

        loop {
            match self.discover() {
                Ok(ip) if self.is_clock_synchronized() => {
                    info!("[NET] Connected, local address {}", ip);
                    return Ok(ip);
                }
                Ok(ip) => {
                    debug!("[NET] Address {} acquired, waiting for clock sync", ip);
                }
                Err(e) => {
                    debug!("[NET] Not connected yet: {}", e);
                }
            }

            if Instant::now() + retry_delay > deadline {
                warn!("[NET] Bring-up did not complete within {:?}", self.config.setup_timeout);
                return Err(anyhow!(
                    "network not ready after {:?}",
                    self.config.setup_timeout
                ));
            }

            tokio::time::sleep(retry_delay).await;
            retry_delay = std::cmp::min(retry_delay * 2, Duration::from_secs(4));
        }
    }
}

impl Connectivity for NetworkMonitor {
    fn local_ipv4(&self) -> Option<Ipv4Addr> {
        self.discover().ok()
    }
}

fn clock_is_plausible(now: SystemTime, min_valid_unix_secs: u64) -> bool {
    now.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() >= min_valid_unix_secs)
        .unwrap_or(false)
}

/// Fixed address for tests
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct StaticNetwork(pub Option<Ipv4Addr>);

#[cfg(test)]
impl Connectivity for StaticNetwork {
    fn local_ipv4(&self) -> Option<Ipv4Addr> {
        self.0
    }
}
