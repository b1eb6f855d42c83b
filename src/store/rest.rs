//! REST store client
//!
//! Speaks the JSON-tree REST dialect of hosted realtime databases:
//! `GET|PUT|DELETE {base_url}/{path}.json`, with an optional `auth` query
//! parameter. Subscriptions use the same URL with
//! `Accept: text/event-stream` on a dedicated HTTP client.

use super::traits::{ensure_scalar, RemoteStore, StoreError, StoreEvent, StoreSubscriber};
use crate::config::StoreConfig;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use wol_shared::stream::{EventDecoder, EventKind};

/// Buffered notifications per subscription
const SUBSCRIPTION_BUFFER: usize = 64;

fn resource_url(base_url: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        format!("{}/.json", base_url)
    } else {
        format!("{}/{}.json", base_url, path)
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    StoreError::Transport(e.to_string())
}

/// Request session: reads, writes and deletes
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    probe_path: String,
    ready: Arc<AtomicBool>,
}

impl RestStore {
    /// Create a request session from config
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            probe_path: config.base_path.clone(),
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Probe the base path once, marking the session ready on success
    pub async fn connect(&self) -> Result<(), StoreError> {
        let req = self
            .client
            .get(resource_url(&self.base_url, &self.probe_path))
            .query(&[("shallow", "true")]);
        self.execute(req).await?;

        info!("[STORE] Request session ready: {}", self.base_url);
        Ok(())
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.query(&[("auth", token.as_str())]),
            None => req,
        }
    }

    /// Send a request and check its status
    ///
    /// The session is marked ready only once the status check passes.
    async fn execute(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        let result = match self.apply_auth(req).send().await {
            Ok(resp) => check_status(resp).await,
            Err(e) => Err(transport_error(e)),
        };
        self.track(result)
    }

    /// Record session health from the outcome of a request
    fn track<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        match &result {
            Ok(_) => self.ready.store(true, Ordering::SeqCst),
            Err(StoreError::Transport(e)) => {
                if self.ready.swap(false, Ordering::SeqCst) {
                    warn!("[STORE] Request session lost: {}", e);
                }
            }
            Err(_) => {}
        }
        result
    }

    async fn put(&self, path: &str, body: &Value) -> Result<(), StoreError> {
        let req = self
            .client
            .put(resource_url(&self.base_url, path))
            .json(body);
        self.execute(req).await?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Http {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn read(&self, path: &str) -> Result<Value, StoreError> {
        let req = self.client.get(resource_url(&self.base_url, path));
        let resp = match self.execute(req).await {
            Ok(resp) => resp,
            Err(StoreError::Http { status: 404, .. }) => {
                return Err(StoreError::PathMissing(path.to_string()))
            }
            Err(e) => return Err(e),
        };

        resp.json::<Value>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn write_scalar(&self, path: &str, value: Value) -> Result<(), StoreError> {
        ensure_scalar(path, &value)?;
        self.put(path, &value).await
    }

    async fn write_object(
        &self,
        path: &str,
        object: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.put(path, &Value::Object(object)).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let req = self.client.delete(resource_url(&self.base_url, path));
        self.execute(req).await?;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> bool {
        if self.is_ready() {
            return true;
        }
        match self.connect().await {
            Ok(()) => true,
            Err(e) => {
                debug!("[STORE] Reconnect failed: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "rest"
    }
}

/// Subscription session: a long-lived event stream per subscribed path
pub struct RestSubscriber {
    client: reqwest::Client,
    config: StoreConfig,
}

impl RestSubscriber {
    /// Create the subscription session
    ///
    /// Uses its own HTTP client with no overall request timeout, so the
    /// stream can stay open indefinitely.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl StoreSubscriber for RestSubscriber {
    async fn subscribe(&self, path: &str) -> Result<mpsc::Receiver<StoreEvent>, StoreError> {
        let (event_tx, event_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let client = self.client.clone();
        let config = self.config.clone();
        let url = resource_url(&config.base_url, path);
        tokio::spawn(async move {
            subscription_loop(client, config, url, event_tx).await;
        });

        Ok(event_rx)
    }
}

/// Keep a subscription alive, reconnecting with exponential backoff
async fn subscription_loop(
    client: reqwest::Client,
    config: StoreConfig,
    url: String,
    event_tx: mpsc::Sender<StoreEvent>,
) {
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        let mut req = client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = &config.auth_token {
            req = req.query(&[("auth", token.as_str())]);
        }

        let reason = match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                reconnect_delay = config.reconnect_delay;
                if event_tx.send(StoreEvent::Connected).await.is_err() {
                    break;
                }
                handle_stream(resp, config.stream_idle_timeout, &event_tx).await
            }
            Ok(resp) => format!("subscription rejected: HTTP {}", resp.status()),
            Err(e) => format!("subscription connect failed: {}", e),
        };

        if event_tx
            .send(StoreEvent::Disconnected { reason })
            .await
            .is_err()
        {
            break;
        }

        tokio::time::sleep(reconnect_delay).await;
        reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
    }

    debug!("[STORE] Subscription for {} closed by receiver", url);
}

/// Forward events from an open stream until it ends; returns the reason
async fn handle_stream(
    resp: reqwest::Response,
    idle_timeout: Duration,
    event_tx: &mpsc::Sender<StoreEvent>,
) -> String {
    let mut body = resp.bytes_stream();
    let mut decoder = EventDecoder::new();

    loop {
        let chunk = match timeout(idle_timeout, body.next()).await {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => return format!("stream read error: {}", e),
            Ok(None) => return "stream closed by server".into(),
            Err(_) => return format!("no data for {:?}", idle_timeout),
        };
        decoder.extend(&chunk);

        loop {
            let event = match decoder.decode_next() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => {
                    warn!("[STORE] Dropping undecodable event: {}", e);
                    continue;
                }
            };

            match event.kind {
                EventKind::Put | EventKind::Patch => {
                    let Some(change) = event.change else { continue };
                    if !change.is_root() {
                        debug!("[STORE] Ignoring nested change at {}", change.path);
                        continue;
                    }
                    if event_tx.send(StoreEvent::Changed(change.data)).await.is_err() {
                        return "receiver dropped".into();
                    }
                }
                EventKind::KeepAlive => {}
                EventKind::Cancel | EventKind::AuthRevoked => {
                    return format!("server ended subscription ({:?})", event.kind);
                }
                EventKind::Other(ref name) => {
                    debug!("[STORE] Ignoring stream event '{}'", name);
                }
            }
        }
    }
}
