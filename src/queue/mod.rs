//! Scheduled wake requests
//!
//! This module handles:
//! - Reading the task collection on each poll
//! - Applying per-task delays and dispatching pending tasks
//! - Committing task status and pruning completed tasks

mod processor;

pub use processor::QueueProcessor;
