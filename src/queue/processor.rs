//! Queue Processor
//!
//! One pass reads the whole task collection, then handles every task in
//! turn: re-read it, check its status, wait out its delay, dispatch, and
//! commit `done`. A task's full handling, delay included, completes before
//! the next task is looked at. Deletions of completed tasks are collected
//! during the pass and applied afterwards.
//!
//! Status is written after the packet is sent, so a crash in between can
//! cause a duplicate send on the next pass.

use crate::dispatch::PacketDispatcher;
use crate::store::{RemoteStore, StoreError};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use wol_shared::join_path;
use wol_shared::task::{self, TaskError, TaskStatus};

/// Counters for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// The pass did not run because the store was not ready
    pub deferred: bool,
    /// Task ids enumerated from the bulk read
    pub seen: usize,
    /// Tasks whose packet was dispatched
    pub dispatched: usize,
    /// Tasks committed as `done`
    pub completed: usize,
    /// Tasks marked with an error status
    pub flagged: usize,
    /// Tasks left untouched (not pending, unreadable, malformed)
    pub skipped: usize,
    /// Status writes that failed
    pub failed_writes: usize,
    /// Tasks deleted after the pass
    pub pruned: usize,
    /// Deletions that failed
    pub failed_deletes: usize,
}

/// How a single task was handled
#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskOutcome {
    Skipped,
    AlreadyDone,
    Flagged { written: bool },
    Completed { written: bool },
}

/// Polls the task collection and dispatches pending wake requests
pub struct QueueProcessor {
    store: Arc<dyn RemoteStore>,
    dispatcher: Arc<PacketDispatcher>,
    queue_path: String,
    prune_completed: bool,
}

impl QueueProcessor {
    /// Create a new queue processor
    pub fn new(
        store: Arc<dyn RemoteStore>,
        dispatcher: Arc<PacketDispatcher>,
        queue_path: impl Into<String>,
        prune_completed: bool,
    ) -> Self {
        Self {
            store,
            dispatcher,
            queue_path: queue_path.into(),
            prune_completed,
        }
    }

    fn task_path(&self, id: &str) -> String {
        join_path(&self.queue_path, id)
    }

    /// Run one pass over the queue
    pub async fn process_queue(&self) -> PassReport {
        let mut report = PassReport::default();

        if !self.store.reconnect().await {
            debug!("[QUEUE] Store not ready, deferring pass");
            report.deferred = true;
            return report;
        }

        let ids = match self.enumerate().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("[QUEUE] Could not read {}: {}", self.queue_path, e);
                report.deferred = true;
                return report;
            }
        };
        report.seen = ids.len();
        if ids.is_empty() {
            debug!("[QUEUE] No tasks");
            return report;
        }

        let mut to_delete: Vec<String> = Vec::new();

        for id in &ids {
            match self.process_task(id).await {
                TaskOutcome::Skipped => report.skipped += 1,
                TaskOutcome::AlreadyDone => {
                    report.skipped += 1;
                    if self.prune_completed {
                        to_delete.push(id.clone());
                    }
                }
                TaskOutcome::Flagged { written } => {
                    report.flagged += 1;
                    if !written {
                        report.failed_writes += 1;
                    }
                }
                TaskOutcome::Completed { written } => {
                    report.dispatched += 1;
                    if written {
                        report.completed += 1;
                        if self.prune_completed {
                            to_delete.push(id.clone());
                        }
                    } else {
                        report.failed_writes += 1;
                    }
                }
            }
        }

        for id in &to_delete {
            let path = self.task_path(id);
            match self.store.delete(&path).await {
                Ok(()) => {
                    report.pruned += 1;
                    debug!("[QUEUE] Pruned task {}", id);
                }
                Err(e) => {
                    report.failed_deletes += 1;
                    error!("[QUEUE] Failed to prune task {}: {}", id, e);
                }
            }
        }

        info!(
            "[QUEUE] Pass complete: seen={} dispatched={} completed={} flagged={} skipped={} pruned={}",
            report.seen,
            report.dispatched,
            report.completed,
            report.flagged,
            report.skipped,
            report.pruned
        );
        report
    }

    /// Bulk read used only to enumerate task ids
    async fn enumerate(&self) -> Result<Vec<String>, StoreError> {
        let snapshot = match self.store.read(&self.queue_path).await {
            Ok(value) => value,
            Err(e) if e.is_missing() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let ids = match snapshot {
            Value::Null => Vec::new(),
            Value::Object(map) => map.keys().cloned().collect(),
            // Numeric keys can come back as a sparse array
            Value::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, _)| i.to_string())
                .collect(),
            other => {
                warn!("[QUEUE] Queue is not a collection: {}", other);
                Vec::new()
            }
        };
        Ok(ids)
    }

    async fn process_task(&self, id: &str) -> TaskOutcome {
        let path = self.task_path(id);

        // Fresh read for full field fidelity
        let entry = match self.store.read(&path).await {
            Ok(Value::Null) => {
                debug!("[QUEUE] Task {} disappeared mid-pass", id);
                return TaskOutcome::Skipped;
            }
            Ok(value) => value,
            Err(e) if e.is_missing() => {
                debug!("[QUEUE] Task {} disappeared mid-pass", id);
                return TaskOutcome::Skipped;
            }
            Err(e) => {
                warn!("[QUEUE] Could not read task {}: {}", id, e);
                return TaskOutcome::Skipped;
            }
        };

        let fields = match task::as_object(&entry) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("[QUEUE] Skipping task {}: {}", id, e);
                return TaskOutcome::Skipped;
            }
        };

        let status = match task::extract_status(fields) {
            Ok(status) => status,
            Err(e) => {
                warn!("[QUEUE] Skipping task {}: {}", id, e);
                return TaskOutcome::Skipped;
            }
        };

        if status != TaskStatus::Pending {
            debug!("[QUEUE] Task {} is {}, skipping", id, status);
            return if status.is_prunable() {
                TaskOutcome::AlreadyDone
            } else {
                TaskOutcome::Skipped
            };
        }

        self.handle_pending(id, fields).await
    }

    async fn handle_pending(&self, id: &str, fields: &Map<String, Value>) -> TaskOutcome {
        let mac = match task::extract_mac(fields) {
            Ok(mac) => mac,
            Err(e) => {
                warn!("[QUEUE] Task {} has no usable mac: {}", id, e);
                let written = self.write_status(id, TaskStatus::ErrorMissingMac).await;
                return TaskOutcome::Flagged { written };
            }
        };

        let delay_ms = task::extract_delay(fields).unwrap_or_else(|e: TaskError| {
            warn!("[QUEUE] Task {}: {}, using no delay", id, e);
            0
        });

        if delay_ms > 0 {
            info!("[QUEUE] Task {} waiting {}ms before wake", id, delay_ms);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let outcome = self.dispatcher.send_mac(&mac).await;
        if outcome.is_sent() {
            debug!("[QUEUE] Task {} dispatched to {}", id, mac);
        } else {
            warn!("[QUEUE] Task {} sent no packets: {:?}", id, outcome);
        }

        let written = self.write_status(id, TaskStatus::Done).await;
        if !written {
            warn!("[QUEUE] Task {} stays pending and will be sent again next pass", id);
        }
        TaskOutcome::Completed { written }
    }

    async fn write_status(&self, id: &str, status: TaskStatus) -> bool {
        let path = join_path(&self.task_path(id), "status");
        match self.store.write_scalar(&path, status.to_value()).await {
            Ok(()) => {
                debug!("[QUEUE] Task {} -> {}", id, status);
                true
            }
            Err(e) => {
                error!("[QUEUE] Failed to set task {} to {}: {}", id, status, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WakeConfig;
    use crate::connection::StaticNetwork;
    use crate::store::MemoryStore;
    use crate::transport::recording::RecordingTransport;
    use serde_json::json;
    use std::net::Ipv4Addr;
    use tokio::time::Instant;
    use wol_shared::{MacAddress, WakeTask};

    const QUEUE: &str = "wol/queue";

    fn mac(s: &str) -> MacAddress {
        MacAddress::parse(s).unwrap()
    }

    fn setup(prune: bool) -> (QueueProcessor, Arc<MemoryStore>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = Arc::new(PacketDispatcher::new(
            transport.clone(),
            Arc::new(StaticNetwork(Some(Ipv4Addr::new(192, 168, 1, 20)))),
            WakeConfig::default(),
        ));
        let store = Arc::new(MemoryStore::new());
        let processor = QueueProcessor::new(store.clone(), dispatcher, QUEUE, prune);
        (processor, store, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_task_is_dispatched_and_done() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                "wol/queue/t1",
                Value::Object(WakeTask::pending("AA:BB:CC:DD:EE:FF", 0).to_object()),
            )
            .await;

        let report = processor.process_queue().await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.completed, 1);

        assert_eq!(transport.sent_to(&mac("AA:BB:CC:DD:EE:FF")).len(), 3);
        assert_eq!(store.get("wol/queue/t1/status").await, Some(json!("done")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_elapses_before_dispatch() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                "wol/queue/t1",
                json!({"mac": "AA:BB:CC:DD:EE:FF", "delay": 500, "status": "pending"}),
            )
            .await;

        let start = Instant::now();
        processor.process_queue().await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].at - start >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_string_delay_is_coerced() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                "wol/queue/t1",
                json!({"mac": "AA:BB:CC:DD:EE:FF", "delay": "250", "status": "pending"}),
            )
            .await;

        let start = Instant::now();
        processor.process_queue().await;
        assert!(transport.sent()[0].at - start >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_missing_mac_is_flagged() {
        let (processor, store, transport) = setup(false);
        store.seed("wol/queue/t1", json!({"status": "pending"})).await;

        let report = processor.process_queue().await;
        assert_eq!(report.flagged, 1);
        assert!(transport.sent().is_empty());
        assert_eq!(
            store.get("wol/queue/t1/status").await,
            Some(json!("error_missing_mac"))
        );
    }

    #[tokio::test]
    async fn test_padded_mac_is_flagged() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                "wol/queue/t1",
                json!({"mac": " AA:BB:CC:DD:EE:FF\n", "status": "pending"}),
            )
            .await;

        let report = processor.process_queue().await;
        assert_eq!(report.flagged, 1);
        assert_eq!(report.dispatched, 0);
        assert!(transport.sent().is_empty());
        assert_eq!(
            store.get("wol/queue/t1/status").await,
            Some(json!("error_missing_mac"))
        );
    }

    #[tokio::test]
    async fn test_done_task_is_not_dispatched_again() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                "wol/queue/t1",
                json!({"mac": "AA:BB:CC:DD:EE:FF", "status": "done"}),
            )
            .await;

        let report = processor.process_queue().await;
        assert_eq!(report.skipped, 1);
        assert!(transport.sent().is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_pass_is_idempotent() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                "wol/queue/t1",
                json!({"mac": "AA:BB:CC:DD:EE:FF", "status": "pending"}),
            )
            .await;

        processor.process_queue().await;
        processor.process_queue().await;
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_example_scenario() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                QUEUE,
                json!({
                    "t1": {"mac": "AA:BB:CC:DD:EE:FF", "delay": 1000, "status": "pending"},
                    "t2": {"mac": "bad-mac", "status": "pending"}
                }),
            )
            .await;

        let start = Instant::now();
        let report = processor.process_queue().await;

        assert_eq!(report.seen, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.flagged, 1);
        assert_eq!(store.get("wol/queue/t1/status").await, Some(json!("done")));
        assert_eq!(
            store.get("wol/queue/t2/status").await,
            Some(json!("error_missing_mac"))
        );

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|p| p.mac == mac("AA:BB:CC:DD:EE:FF")));
        assert!(sent[0].at - start >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pruning_removes_completed_tasks() {
        let (processor, store, _transport) = setup(true);
        store
            .seed(
                QUEUE,
                json!({
                    "new": {"mac": "AA:BB:CC:DD:EE:FF", "status": "pending"},
                    "old": {"mac": "AA:BB:CC:DD:EE:01", "status": "done"},
                    "bad": {"status": "pending"}
                }),
            )
            .await;

        let report = processor.process_queue().await;
        assert_eq!(report.pruned, 2);

        let remaining = store.get(QUEUE).await.unwrap();
        let remaining = remaining.as_object().unwrap();
        assert!(!remaining.contains_key("new"));
        assert!(!remaining.contains_key("old"));
        assert_eq!(remaining["bad"]["status"], json!("error_missing_mac"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_done_write_keeps_task_pending() {
        let (processor, store, transport) = setup(true);
        store
            .seed(
                "wol/queue/t1",
                json!({"mac": "AA:BB:CC:DD:EE:FF", "status": "pending"}),
            )
            .await;
        store.fail_writes_to("wol/queue/t1/status").await;

        let report = processor.process_queue().await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.failed_writes, 1);
        assert_eq!(report.pruned, 0);
        assert_eq!(store.get("wol/queue/t1/status").await, Some(json!("pending")));

        // Retried, and sent again, on the next pass
        processor.process_queue().await;
        assert_eq!(transport.sent().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delete_does_not_abort_others() {
        let (processor, store, _transport) = setup(true);
        store
            .seed(
                QUEUE,
                json!({
                    "a": {"mac": "AA:BB:CC:DD:EE:FF", "status": "done"},
                    "b": {"mac": "AA:BB:CC:DD:EE:FF", "status": "done"}
                }),
            )
            .await;
        store.fail_deletes_of("wol/queue/a").await;

        let report = processor.process_queue().await;
        assert_eq!(report.pruned, 1);
        assert_eq!(report.failed_deletes, 1);
        assert!(store.get("wol/queue/a").await.is_some());
        assert!(store.get("wol/queue/b").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_entries_do_not_stop_the_pass() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                QUEUE,
                json!({
                    "scalar": "oops",
                    "nostatus": {"mac": "AA:BB:CC:DD:EE:FF"},
                    "numstatus": {"mac": "AA:BB:CC:DD:EE:FF", "status": 7},
                    "paused": {"mac": "AA:BB:CC:DD:EE:FF", "status": "paused"},
                    "ok": {"mac": "AA:BB:CC:DD:EE:02", "status": "pending", "delay": "later"}
                }),
            )
            .await;

        let report = processor.process_queue().await;
        assert_eq!(report.seen, 5);
        assert_eq!(report.skipped, 4);
        assert_eq!(report.completed, 1);
        assert_eq!(transport.sent_to(&mac("AA:BB:CC:DD:EE:02")).len(), 3);
        assert_eq!(
            store.get("wol/queue/nostatus").await,
            Some(json!({"mac": "AA:BB:CC:DD:EE:FF"}))
        );
    }

    #[tokio::test]
    async fn test_unreadable_task_is_skipped() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                "wol/queue/t1",
                json!({"mac": "AA:BB:CC:DD:EE:FF", "status": "pending"}),
            )
            .await;
        store.fail_reads_from("wol/queue/t1").await;

        let report = processor.process_queue().await;
        assert_eq!(report.skipped, 1);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_store_not_ready_defers_pass() {
        let (processor, store, transport) = setup(false);
        store
            .seed(
                "wol/queue/t1",
                json!({"mac": "AA:BB:CC:DD:EE:FF", "status": "pending"}),
            )
            .await;
        store.set_ready(false);

        let report = processor.process_queue().await;
        assert!(report.deferred);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_or_empty_queue_is_zero_tasks() {
        let (processor, store, _transport) = setup(false);
        assert_eq!(processor.process_queue().await.seen, 0);

        store.seed(QUEUE, json!({})).await;
        let report = processor.process_queue().await;
        assert_eq!(report, PassReport::default());
    }
}
