//! UDP broadcast transport for wake packets

use crate::transport::traits::WakeTransport;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;
use wol_shared::{codec, MacAddress};

/// Sends wake packets as IPv4 UDP broadcast datagrams
pub struct UdpWakeTransport {
    bind_address: SocketAddrV4,
}

impl UdpWakeTransport {
    /// Bind to an ephemeral port on all interfaces
    pub fn new() -> Self {
        Self {
            bind_address: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
        }
    }

    /// Bind to a specific local address
    #[cfg(test)]
    pub fn with_bind_address(bind_address: SocketAddrV4) -> Self {
        Self { bind_address }
    }
}

impl Default for UdpWakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WakeTransport for UdpWakeTransport {
    async fn broadcast(&self, mac: &MacAddress, target: SocketAddrV4) -> Result<()> {
        let socket = UdpSocket::bind(self.bind_address).await?;
        socket.set_broadcast(true)?;

        let packet = codec::encode(mac);
        let sent = socket.send_to(&packet, target).await?;
        if sent != packet.len() {
            return Err(anyhow!(
                "short send: {} of {} bytes to {}",
                sent,
                packet.len(),
                target
            ));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "UDP"
    }
}
