//! Remote store collaborator
//!
//! This module provides:
//! - The request/response and subscription traits the core depends on
//! - A REST client with a separate event-stream subscription session
//! - An in-memory store for offline runs and tests

mod memory;
mod rest;
mod traits;

pub use memory::MemoryStore;
pub use rest::{RestStore, RestSubscriber};
pub use traits::{RemoteStore, StoreError, StoreEvent, StoreSubscriber};
