//! WoL Shared Types
//!
//! This crate provides the pure building blocks shared by the edge device:
//! hardware address parsing, wake packet framing, the task record stored in
//! the remote queue, the trigger decision logic and the store event-stream
//! decoder. Nothing in here performs I/O.

pub mod codec;
pub mod mac;
pub mod state_machine;
pub mod stream;
pub mod task;

pub use mac::{MacAddress, MacError};
pub use task::{TaskError, TaskStatus, WakeTask};

/// Operating defaults for the device
pub mod defaults {
    /// Interval between queue passes in milliseconds
    pub const QUEUE_POLL_INTERVAL_MS: u64 = 15_000;

    /// Number of wake packets emitted per dispatch
    pub const WAKE_REPEAT: u32 = 3;

    /// Gap between repeated wake packets in milliseconds
    pub const WAKE_SPACING_MS: u64 = 50;

    /// UDP discard port, the conventional wake packet destination
    pub const WAKE_PORT: u16 = 9;

    /// Whether completed tasks are deleted from the queue
    pub const PRUNE_COMPLETED: bool = false;

    /// Root of the device's subtree in the remote store
    pub const STORE_BASE_PATH: &str = "wol";

    /// Key of the instant trigger flag under the base path
    pub const TRIGGER_KEY: &str = "trigger";

    /// Key of the task collection under the base path
    pub const QUEUE_KEY: &str = "queue";
}

/// Join a base path and a key into a store path without doubled slashes
pub fn join_path(base: &str, key: &str) -> String {
    let base = base.trim_matches('/');
    let key = key.trim_matches('/');
    match (base.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("wol", "trigger"), "wol/trigger");
        assert_eq!(join_path("/wol/", "/queue"), "wol/queue");
        assert_eq!(join_path("", "queue"), "queue");
        assert_eq!(join_path("wol/queue", ""), "wol/queue");
    }
}
