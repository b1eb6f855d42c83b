//! Recording transport for tests

use crate::transport::traits::WakeTransport;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;
use wol_shared::MacAddress;

/// One captured broadcast
#[derive(Debug, Clone)]
pub struct SentPacket {
    pub mac: MacAddress,
    pub target: SocketAddrV4,
    pub at: Instant,
}

/// Captures every broadcast instead of sending it
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentPacket>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent broadcast fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentPacket> {
        self.sent.lock().unwrap().clone()
    }

    /// Captured broadcasts for one address
    pub fn sent_to(&self, mac: &MacAddress) -> Vec<SentPacket> {
        self.sent().into_iter().filter(|p| &p.mac == mac).collect()
    }
}

#[async_trait]
impl WakeTransport for RecordingTransport {
    async fn broadcast(&self, mac: &MacAddress, target: SocketAddrV4) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("injected send failure"));
        }
        self.sent.lock().unwrap().push(SentPacket {
            mac: *mac,
            target,
            at: Instant::now(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
