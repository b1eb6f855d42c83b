//! Structure bootstrapper
//!
//! Makes sure the trigger flag and the task collection exist before the
//! watcher and the queue processor start using them. Existing values are
//! never overwritten.

use crate::store::RemoteStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Default written when a path is absent
enum Placeholder {
    Flag,
    Collection,
}

/// Creates missing store paths with their default values
pub struct StructureBootstrapper {
    store: Arc<dyn RemoteStore>,
    trigger_path: String,
    queue_path: String,
}

impl StructureBootstrapper {
    /// Create a new bootstrapper for the given flag and queue paths
    pub fn new(
        store: Arc<dyn RemoteStore>,
        trigger_path: impl Into<String>,
        queue_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            trigger_path: trigger_path.into(),
            queue_path: queue_path.into(),
        }
    }

    /// Create the trigger flag (`false`) and the empty task collection if
    /// either is absent
    ///
    /// Returns false if a default could not be written. A read failure other
    /// than "absent" is not treated as absence; the path is left alone.
    pub async fn ensure_structure(&self) -> bool {
        let flag = self.ensure(&self.trigger_path, Placeholder::Flag).await;
        let queue = self.ensure(&self.queue_path, Placeholder::Collection).await;
        flag && queue
    }

    async fn ensure(&self, path: &str, placeholder: Placeholder) -> bool {
        match self.store.read(path).await {
            Ok(Value::Null) => {}
            Ok(_) => return true,
            Err(e) if e.is_missing() => {}
            Err(e) => {
                warn!("[BOOT] Could not check {}, leaving it as is: {}", path, e);
                return true;
            }
        }

        let written = match placeholder {
            Placeholder::Flag => self.store.write_scalar(path, Value::Bool(false)).await,
            Placeholder::Collection => self.store.write_object(path, Map::new()).await,
        };

        match written {
            Ok(()) => {
                info!("[BOOT] Created {}", path);
                true
            }
            Err(e) => {
                error!("[BOOT] Failed to create {}: {}", path, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn bootstrapper(store: Arc<MemoryStore>) -> StructureBootstrapper {
        StructureBootstrapper::new(store, "wol/trigger", "wol/queue")
    }

    #[tokio::test]
    async fn test_creates_missing_structure() {
        let store = Arc::new(MemoryStore::new());
        assert!(bootstrapper(store.clone()).ensure_structure().await);

        assert_eq!(store.get("wol/trigger").await, Some(json!(false)));
        assert_eq!(store.get("wol/queue").await, Some(json!({})));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_second_call_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let boot = bootstrapper(store.clone());
        assert!(boot.ensure_structure().await);
        assert!(boot.ensure_structure().await);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_existing_values_are_kept() {
        let store = Arc::new(MemoryStore::new());
        store.seed("wol/trigger", json!(true)).await;
        store
            .seed("wol/queue/t1", json!({"mac": "AA:BB:CC:DD:EE:FF", "status": "pending"}))
            .await;

        assert!(bootstrapper(store.clone()).ensure_structure().await);
        assert_eq!(store.get("wol/trigger").await, Some(json!(true)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_null_counts_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.seed("wol/trigger", Value::Null).await;

        assert!(bootstrapper(store.clone()).ensure_structure().await);
        assert_eq!(store.get("wol/trigger").await, Some(json!(false)));
    }

    #[tokio::test]
    async fn test_read_failure_is_not_absence() {
        let store = Arc::new(MemoryStore::new());
        store.fail_reads_from("wol/trigger").await;

        assert!(bootstrapper(store.clone()).ensure_structure().await);
        assert_eq!(store.get("wol/trigger").await, None);
        assert_eq!(store.get("wol/queue").await, Some(json!({})));
    }

    #[tokio::test]
    async fn test_failed_write_reports_false() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes_to("wol/queue").await;

        assert!(!bootstrapper(store.clone()).ensure_structure().await);
        assert_eq!(store.get("wol/trigger").await, Some(json!(false)));
    }
}
