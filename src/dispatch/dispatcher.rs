//! Packet dispatcher - validates an address and emits paced wake packets

use crate::config::WakeConfig;
use crate::connection::Connectivity;
use crate::transport::WakeTransport;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use wol_shared::{MacAddress, MacError};

/// Result of a dispatch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Packets were handed to the transport (delivery is never confirmed)
    Sent {
        packets: u32,
        broadcast: Ipv4Addr,
    },
    /// The address failed validation; nothing was sent
    Rejected(MacError),
    /// No local IPv4 address, so no broadcast address could be derived
    NoNetwork,
}

impl DispatchOutcome {
    /// Whether at least one packet left the device
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { packets, .. } if *packets > 0)
    }
}

/// Broadcast address of the device's /24: last octet set to 255
pub fn broadcast_for(local: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = local.octets();
    Ipv4Addr::new(a, b, c, 255)
}

/// Shared sink for wake requests from the trigger watcher and the queue
pub struct PacketDispatcher {
    transport: Arc<dyn WakeTransport>,
    network: Arc<dyn Connectivity>,
    config: WakeConfig,
}

impl PacketDispatcher {
    /// Create a new dispatcher
    pub fn new(
        transport: Arc<dyn WakeTransport>,
        network: Arc<dyn Connectivity>,
        config: WakeConfig,
    ) -> Self {
        Self {
            transport,
            network,
            config,
        }
    }

    /// Validate `hardware_address` and emit wake packets for it
    ///
    /// Invalid addresses are logged and rejected without sending.
    pub async fn send(&self, hardware_address: &str) -> DispatchOutcome {
        match MacAddress::parse(hardware_address) {
            Ok(mac) => self.send_mac(&mac).await,
            Err(e) => {
                error!(
                    "[DISPATCH] Rejected address '{}': {}",
                    hardware_address, e
                );
                DispatchOutcome::Rejected(e)
            }
        }
    }

    /// Emit `repeat` wake packets for an already validated address
    pub async fn send_mac(&self, mac: &MacAddress) -> DispatchOutcome {
        let local = match self.network.local_ipv4() {
            Some(ip) => ip,
            None => {
                error!("[DISPATCH] No local IPv4 address, cannot wake {}", mac);
                return DispatchOutcome::NoNetwork;
            }
        };

        let broadcast = broadcast_for(local);
        let target = SocketAddrV4::new(broadcast, self.config.port);
        let mut packets = 0;

        for attempt in 0..self.config.repeat {
            if attempt > 0 {
                tokio::time::sleep(self.config.spacing).await;
            }

            match self.transport.broadcast(mac, target).await {
                Ok(()) => {
                    packets += 1;
                    debug!(
                        "[DISPATCH] Packet {}/{} for {} via {}",
                        attempt + 1,
                        self.config.repeat,
                        mac,
                        self.transport.name()
                    );
                }
                Err(e) => {
                    warn!(
                        "[DISPATCH] Packet {}/{} for {} failed: {}",
                        attempt + 1,
                        self.config.repeat,
                        mac,
                        e
                    );
                }
            }
        }

        info!("[DISPATCH] Wake {} -> {} ({} packets)", mac, target, packets);
        DispatchOutcome::Sent { packets, broadcast }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::StaticNetwork;
    use crate::transport::recording::RecordingTransport;
    use std::time::Duration;

    fn dispatcher(
        transport: Arc<RecordingTransport>,
        ip: Option<Ipv4Addr>,
    ) -> PacketDispatcher {
        PacketDispatcher::new(transport, Arc::new(StaticNetwork(ip)), WakeConfig::default())
    }

    #[test]
    fn test_broadcast_for() {
        assert_eq!(
            broadcast_for(Ipv4Addr::new(192, 168, 1, 42)),
            Ipv4Addr::new(192, 168, 1, 255)
        );
        assert_eq!(
            broadcast_for(Ipv4Addr::new(10, 0, 7, 255)),
            Ipv4Addr::new(10, 0, 7, 255)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_address_sends_three_paced_packets() {
        let transport = Arc::new(RecordingTransport::new());
        let d = dispatcher(transport.clone(), Some(Ipv4Addr::new(192, 168, 1, 42)));

        let outcome = d.send("AA:BB:CC:DD:EE:FF").await;
        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                packets: 3,
                broadcast: Ipv4Addr::new(192, 168, 1, 255)
            }
        );

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        for packet in &sent {
            assert_eq!(packet.target, SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 255), 9));
            assert_eq!(packet.mac.to_string(), "AA:BB:CC:DD:EE:FF");
        }
        assert!(sent[1].at - sent[0].at >= Duration::from_millis(50));
        assert!(sent[2].at - sent[1].at >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_invalid_address_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let d = dispatcher(transport.clone(), Some(Ipv4Addr::new(192, 168, 1, 42)));

        for bad in ["bad-mac", "AA:BB:CC:DD:EE", "AA-BB-CC-DD-EE-FF", "ZZ:BB:CC:DD:EE:FF", ""] {
            let outcome = d.send(bad).await;
            assert!(matches!(outcome, DispatchOutcome::Rejected(_)), "{}", bad);
        }
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_no_network_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let d = dispatcher(transport.clone(), None);

        assert_eq!(d.send("AA:BB:CC:DD:EE:FF").await, DispatchOutcome::NoNetwork);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_is_not_fatal() {
        let transport = Arc::new(RecordingTransport::new());
        transport.set_failing(true);
        let d = dispatcher(transport.clone(), Some(Ipv4Addr::new(10, 0, 0, 5)));

        let outcome = d.send("AA:BB:CC:DD:EE:FF").await;
        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                packets: 0,
                broadcast: Ipv4Addr::new(10, 0, 0, 255)
            }
        );
        assert!(!outcome.is_sent());
    }
}
