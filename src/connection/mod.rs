//! Network connectivity for the edge device
//!
//! This module handles:
//! - Discovering the device's local IPv4 address
//! - Reporting link status to the dispatcher
//! - Waiting for link and clock synchronisation at startup

mod manager;

pub use manager::{Connectivity, NetworkMonitor};

#[cfg(test)]
pub use manager::StaticNetwork;
