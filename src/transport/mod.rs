pub mod traits;
pub mod udp;

#[cfg(test)]
pub mod recording;

pub use traits::WakeTransport;
pub use udp::UdpWakeTransport;
