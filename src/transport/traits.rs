//! Transport trait abstraction for wake packet emission

use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddrV4;
use wol_shared::MacAddress;

/// Sends a single wake packet; repetition and pacing belong to the caller
#[async_trait]
pub trait WakeTransport: Send + Sync {
    /// Broadcast one wake packet for `mac` to `target`
    async fn broadcast(&self, mac: &MacAddress, target: SocketAddrV4) -> Result<()>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
