//! Trigger Watcher
//!
//! Consumes change notifications for the trigger flag from a subscription
//! channel. Each `true` wakes the fixed target and writes the flag back to
//! `false` over the request session, never over the subscription.

use crate::dispatch::{DispatchOutcome, PacketDispatcher};
use crate::store::{RemoteStore, StoreEvent};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wol_shared::state_machine::{TriggerAction, TriggerStateMachine};

/// What handling one notification produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Target was dispatched; `reset` tells whether `false` was written back
    Dispatched {
        dispatch: DispatchOutcome,
        reset: bool,
    },
    /// Flag was false, or the event carried no value
    Ignored,
    /// Flag value was not a boolean
    Rejected,
}

/// Watches the trigger flag and wakes the configured target
pub struct TriggerWatcher {
    dispatcher: Arc<PacketDispatcher>,
    store: Arc<dyn RemoteStore>,
    trigger_path: String,
    target_mac: String,
    fsm: TriggerStateMachine,
}

impl TriggerWatcher {
    /// Create a new trigger watcher
    pub fn new(
        dispatcher: Arc<PacketDispatcher>,
        store: Arc<dyn RemoteStore>,
        trigger_path: impl Into<String>,
        target_mac: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            trigger_path: trigger_path.into(),
            target_mac: target_mac.into(),
            fsm: TriggerStateMachine::new(),
        }
    }

    /// Number of dispatches performed so far
    #[cfg(test)]
    pub fn dispatch_count(&self) -> u64 {
        self.fsm.dispatch_count()
    }

    /// Handle one subscription event
    pub async fn handle_event(&mut self, event: StoreEvent) -> TriggerOutcome {
        match event {
            StoreEvent::Connected => {
                info!("[TRIGGER] Subscribed to {}", self.trigger_path);
                TriggerOutcome::Ignored
            }
            StoreEvent::Disconnected { reason } => {
                // The subscriber reconnects by itself
                warn!("[TRIGGER] Subscription interrupted: {}", reason);
                TriggerOutcome::Ignored
            }
            StoreEvent::Changed(value) => self.handle_change(&value).await,
        }
    }

    async fn handle_change(&mut self, value: &Value) -> TriggerOutcome {
        let previous = self.fsm.last_seen();

        match self.fsm.on_notification(value) {
            TriggerAction::DispatchAndReset => {
                if self.fsm.is_repeat_set(previous) {
                    warn!("[TRIGGER] Flag still set from an earlier trigger, dispatching again");
                }
                info!("[TRIGGER] Flag set, waking {}", self.target_mac);

                let dispatch = self.dispatcher.send(&self.target_mac).await;
                if dispatch.is_sent() {
                    info!(
                        "[TRIGGER] Wake #{} sent to {}",
                        self.fsm.dispatch_count(),
                        self.target_mac
                    );
                } else {
                    warn!("[TRIGGER] No packet left the device: {:?}", dispatch);
                }
                let reset = match self
                    .store
                    .write_scalar(&self.trigger_path, Value::Bool(false))
                    .await
                {
                    Ok(()) => {
                        debug!("[TRIGGER] Flag reset");
                        true
                    }
                    Err(e) => {
                        error!(
                            "[TRIGGER] Failed to reset {} (left set): {}",
                            self.trigger_path, e
                        );
                        false
                    }
                };

                TriggerOutcome::Dispatched { dispatch, reset }
            }
            TriggerAction::Ignore => {
                debug!("[TRIGGER] Flag clear");
                TriggerOutcome::Ignored
            }
            TriggerAction::Reject { reason } => {
                warn!("[TRIGGER] Ignoring value {}: {}", value, reason);
                TriggerOutcome::Rejected
            }
        }
    }

    /// Process events until the channel closes
    pub async fn run(mut self, mut events: mpsc::Receiver<StoreEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        error!("[TRIGGER] Subscription channel closed");
    }

    /// Spawn the watcher as a background task
    pub fn start(self, events: mpsc::Receiver<StoreEvent>) -> TriggerWatcherHandle {
        let handle = tokio::spawn(self.run(events));
        TriggerWatcherHandle { task: handle }
    }
}

/// Handle to the background watcher task
pub struct TriggerWatcherHandle {
    task: tokio::task::JoinHandle<()>,
}

impl TriggerWatcherHandle {
    /// Whether the watcher has stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
