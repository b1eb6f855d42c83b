//! Trigger Module
//!
//! Watches the instant trigger flag and wakes the fixed target whenever it
//! is set.

mod watcher;

pub use watcher::{TriggerWatcher, TriggerWatcherHandle};
