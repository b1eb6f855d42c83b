//! Device configuration
//!
//! Everything is fixed at build time. Credentials and the store endpoint can
//! be injected through `WOL_*` environment variables when compiling; anything
//! not provided falls back to the built-in defaults below.

use std::time::Duration;
use wol_shared::{defaults, join_path};

/// Store endpoint, overridable at build time
const STORE_URL: Option<&str> = option_env!("WOL_STORE_URL");
/// Store credential, overridable at build time
const STORE_AUTH: Option<&str> = option_env!("WOL_STORE_AUTH");
/// Fixed target for the instant trigger, overridable at build time
const TARGET_MAC: Option<&str> = option_env!("WOL_TARGET_MAC");
/// Pruning toggle, overridable at build time
const PRUNE: Option<&str> = option_env!("WOL_PRUNE");

const DEFAULT_TARGET_MAC: &str = "AA:BB:CC:DD:EE:FF";

/// Remote store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// REST endpoint, e.g. `https://example-db.firebaseio.com`. Empty runs offline.
    pub base_url: String,
    /// Database secret or ID token appended as `auth=` query parameter
    pub auth_token: Option<String>,
    /// Root of the device subtree
    pub base_path: String,
    pub trigger_key: String,
    pub queue_key: String,
    /// Timeout for request/response operations (not the subscription)
    pub request_timeout: Duration,
    /// Subscription reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum subscription reconnection delay
    pub max_reconnect_delay: Duration,
    /// Subscription is considered dead after this long without bytes
    /// (the server sends keep-alives every 30 seconds)
    pub stream_idle_timeout: Duration,
}

impl StoreConfig {
    /// Full path of the trigger flag
    pub fn trigger_path(&self) -> String {
        join_path(&self.base_path, &self.trigger_key)
    }

    /// Full path of the task collection
    pub fn queue_path(&self) -> String {
        join_path(&self.base_path, &self.queue_key)
    }

    /// Whether a remote endpoint is configured
    pub fn is_offline(&self) -> bool {
        self.base_url.trim().is_empty()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: STORE_URL.unwrap_or_default().trim_end_matches('/').to_string(),
            auth_token: STORE_AUTH.filter(|s| !s.is_empty()).map(String::from),
            base_path: defaults::STORE_BASE_PATH.into(),
            trigger_key: defaults::TRIGGER_KEY.into(),
            queue_key: defaults::QUEUE_KEY.into(),
            request_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            stream_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Wake packet emission
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Target of the instant trigger
    pub target_mac: String,
    /// UDP destination port
    pub port: u16,
    /// Packets per dispatch
    pub repeat: u32,
    /// Gap between packets
    pub spacing: Duration,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            target_mac: TARGET_MAC.unwrap_or(DEFAULT_TARGET_MAC).into(),
            port: defaults::WAKE_PORT,
            repeat: defaults::WAKE_REPEAT,
            spacing: Duration::from_millis(defaults::WAKE_SPACING_MS),
        }
    }
}

/// Queue polling
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub poll_interval: Duration,
    /// Delete tasks once they reach `done`
    pub prune_completed: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(defaults::QUEUE_POLL_INTERVAL_MS),
            prune_completed: PRUNE
                .map(|v| matches!(v, "1" | "true" | "yes"))
                .unwrap_or(defaults::PRUNE_COMPLETED),
        }
    }
}

/// Network bring-up
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Address used to select the outbound interface (no traffic is sent)
    pub probe_address: String,
    /// How long setup may take before the device halts
    pub setup_timeout: Duration,
    /// Wall clock below this is considered unsynchronised
    pub min_valid_unix_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_address: "8.8.8.8:80".into(),
            setup_timeout: Duration::from_secs(30),
            // 2024-01-01T00:00:00Z
            min_valid_unix_secs: 1_704_067_200,
        }
    }
}

/// Complete device configuration
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Identifier used in logs
    pub device_id: String,
    pub store: StoreConfig,
    pub wake: WakeConfig,
    pub queue: QueueConfig,
    pub network: NetworkConfig,
}

impl DeviceConfig {
    /// Build the compiled-in configuration
    pub fn compiled() -> Self {
        Self {
            device_id: "wol-edge-001".into(),
            ..Default::default()
        }
    }
}
