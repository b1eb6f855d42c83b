//! Remote store abstraction
//!
//! The device talks to a hierarchical JSON tree through two independent
//! sessions: a request session for reads, writes and deletes, and a
//! subscription session that only delivers change notifications. Keeping
//! them apart means a slow periodic request can never starve the
//! subscription's keep-alive traffic.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors returned by store operations
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Store session not connected")]
    NotConnected,

    #[error("Path missing: {0}")]
    PathMissing(String),

    #[error("Store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed store response: {0}")]
    Decode(String),

    #[error("Value for {path} must be a scalar")]
    NotScalar { path: String },
}

impl StoreError {
    /// Whether the error means the path holds no value
    pub fn is_missing(&self) -> bool {
        matches!(self, StoreError::PathMissing(_))
    }
}

/// Events delivered on a subscription channel
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// Subscription (re)established
    Connected,
    /// The subscribed value changed; carries the new value
    Changed(Value),
    /// The subscription dropped; the subscriber reconnects on its own
    Disconnected { reason: String },
}

/// Request/response operations against the store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the value at `path`
    ///
    /// A path holding `null` yields `Ok(Value::Null)`. Backends that can
    /// tell a missing path apart report `StoreError::PathMissing`.
    async fn read(&self, path: &str) -> Result<Value, StoreError>;

    /// Replace the value at `path` with a scalar
    async fn write_scalar(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Replace the value at `path` with an object
    async fn write_object(&self, path: &str, object: Map<String, Value>)
        -> Result<(), StoreError>;

    /// Remove `path` and everything below it
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Whether the request session is usable right now
    fn is_ready(&self) -> bool;

    /// Try to restore a dropped request session; returns readiness
    async fn reconnect(&self) -> bool {
        self.is_ready()
    }

    /// Human-readable name for logs
    fn name(&self) -> &'static str;
}

/// Change notifications for a single path
#[async_trait]
pub trait StoreSubscriber: Send + Sync {
    /// Start delivering changes of `path` on the returned channel
    ///
    /// The first `Changed` event carries the current value.
    async fn subscribe(&self, path: &str) -> Result<mpsc::Receiver<StoreEvent>, StoreError>;
}

/// Reject non-scalar values before they reach a backend
pub(crate) fn ensure_scalar(path: &str, value: &Value) -> Result<(), StoreError> {
    match value {
        Value::Object(_) | Value::Array(_) => Err(StoreError::NotScalar {
            path: path.to_string(),
        }),
        _ => Ok(()),
    }
}
