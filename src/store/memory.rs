//! In-memory store
//!
//! Holds the JSON tree in process. Used when no remote endpoint is compiled
//! in, and by tests, which also use its fault injection and write counters.

use super::traits::{ensure_scalar, RemoteStore, StoreError, StoreEvent, StoreSubscriber};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Buffered notifications per subscription
const SUBSCRIPTION_BUFFER: usize = 64;

struct Subscription {
    path: Vec<String>,
    tx: mpsc::Sender<StoreEvent>,
}

#[derive(Default)]
struct Inner {
    root: Value,
    subscriptions: Vec<Subscription>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    failing_deletes: HashSet<String>,
}

/// JSON tree kept in memory
pub struct MemoryStore {
    inner: Mutex<Inner>,
    ready: AtomicBool,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty, ready store
    pub fn new() -> Self {
        Self::with_root(Value::Object(Map::new()))
    }

    /// Create a ready store holding `root`
    pub fn with_root(root: Value) -> Self {
        Self {
            inner: Mutex::new(Inner {
                root,
                ..Default::default()
            }),
            ready: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    fn check_ready(&self) -> Result<(), StoreError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }

    async fn put(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.check_ready()?;
        let mut inner = self.inner.lock().await;
        if inner.failing_writes.contains(&normalize(path)) {
            return Err(StoreError::Transport(format!("injected write failure at {}", path)));
        }

        let segs = segments(path);
        assign(&mut inner.root, &segs, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        notify(&mut inner, &segs);
        Ok(())
    }
}

/// Fault injection and inspection for tests
#[cfg(test)]
impl MemoryStore {
    /// Mark the session connected or disconnected
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Make reads of exactly `path` fail
    pub async fn fail_reads_from(&self, path: &str) {
        self.inner.lock().await.failing_reads.insert(normalize(path));
    }

    /// Make writes to exactly `path` fail
    pub async fn fail_writes_to(&self, path: &str) {
        self.inner.lock().await.failing_writes.insert(normalize(path));
    }

    /// Make deletes of exactly `path` fail
    pub async fn fail_deletes_of(&self, path: &str) {
        self.inner.lock().await.failing_deletes.insert(normalize(path));
    }

    /// Number of successful write operations
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful delete operations
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Inspect the value at `path` without going through the session
    pub async fn get(&self, path: &str) -> Option<Value> {
        let inner = self.inner.lock().await;
        lookup(&inner.root, &segments(path)).cloned()
    }

    /// Place a value without counting it as a device write
    pub async fn seed(&self, path: &str, value: Value) {
        let mut inner = self.inner.lock().await;
        let segs = segments(path);
        assign(&mut inner.root, &segs, value);
        notify(&mut inner, &segs);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Value, StoreError> {
        self.check_ready()?;
        let inner = self.inner.lock().await;
        if inner.failing_reads.contains(&normalize(path)) {
            return Err(StoreError::Transport(format!("injected read failure at {}", path)));
        }

        lookup(&inner.root, &segments(path))
            .cloned()
            .ok_or_else(|| StoreError::PathMissing(path.to_string()))
    }

    async fn write_scalar(&self, path: &str, value: Value) -> Result<(), StoreError> {
        ensure_scalar(path, &value)?;
        self.put(path, value).await
    }

    async fn write_object(
        &self,
        path: &str,
        object: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.put(path, Value::Object(object)).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check_ready()?;
        let mut inner = self.inner.lock().await;
        if inner.failing_deletes.contains(&normalize(path)) {
            return Err(StoreError::Transport(format!("injected delete failure at {}", path)));
        }

        let segs = segments(path);
        remove(&mut inner.root, &segs);
        self.deletes.fetch_add(1, Ordering::SeqCst);
        notify(&mut inner, &segs);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl StoreSubscriber for MemoryStore {
    async fn subscribe(&self, path: &str) -> Result<mpsc::Receiver<StoreEvent>, StoreError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let segs = segments(path);

        let mut inner = self.inner.lock().await;
        let current = lookup(&inner.root, &segs).cloned().unwrap_or(Value::Null);
        let _ = tx.try_send(StoreEvent::Connected);
        let _ = tx.try_send(StoreEvent::Changed(current));

        inner.subscriptions.push(Subscription { path: segs, tx });
        debug!("[STORE] memory subscription added for {}", path);
        Ok(rx)
    }
}

fn normalize(path: &str) -> String {
    segments(path).join("/")
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn lookup<'a>(root: &'a Value, segs: &[String]) -> Option<&'a Value> {
    segs.iter().try_fold(root, |node, key| match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn assign(root: &mut Value, segs: &[String], value: Value) {
    let Some((last, parents)) = segs.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for key in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert(last.clone(), value);
    }
}

fn remove(root: &mut Value, segs: &[String]) {
    let Some((last, parents)) = segs.split_last() else {
        *root = Value::Object(Map::new());
        return;
    };

    let mut node = root;
    for key in parents {
        node = match node {
            Value::Object(map) => match map.get_mut(key) {
                Some(child) => child,
                None => return,
            },
            _ => return,
        };
    }

    if let Value::Object(map) = node {
        map.remove(last);
    }
}

/// Push the new value to every subscription overlapping `changed`
fn notify(inner: &mut Inner, changed: &[String]) {
    let root = &inner.root;
    inner.subscriptions.retain(|sub| {
        if sub.tx.is_closed() {
            return false;
        }
        let overlaps = sub.path.starts_with(changed) || changed.starts_with(&sub.path);
        if overlaps {
            let value = lookup(root, &sub.path).cloned().unwrap_or(Value::Null);
            let _ = sub.tx.try_send(StoreEvent::Changed(value));
        }
        true
    });
}
