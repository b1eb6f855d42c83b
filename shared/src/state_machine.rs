//! Trigger State Machine
//!
//! Decides what a change of the instant trigger flag means. The flag is a
//! one-shot signal: every notification carrying `true` asks for exactly one
//! dispatch to the configured target followed by a reset to `false`.

use serde_json::Value;

/// Observed value of the trigger flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagValue {
    Set,
    Clear,
    /// Not a boolean (null, string, number, object)
    Invalid,
}

impl FlagValue {
    /// Classify a raw store value
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(true) => FlagValue::Set,
            Value::Bool(false) => FlagValue::Clear,
            _ => FlagValue::Invalid,
        }
    }
}

/// What the watcher should do in response to a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAction {
    /// Send a wake packet to the fixed target, then write `false`
    DispatchAndReset,
    /// Nothing to do
    Ignore,
    /// The value could not be interpreted; log and ignore
    Reject { reason: String },
}

/// Pure decision for a flag notification given the previously seen value
///
/// `previous` only affects reporting: a `true` notification always
/// dispatches, including a repeated `true` after a failed reset.
pub fn evaluate(previous: Option<FlagValue>, current: FlagValue) -> TriggerAction {
    match (previous, current) {
        (_, FlagValue::Set) => TriggerAction::DispatchAndReset,
        (_, FlagValue::Clear) => TriggerAction::Ignore,
        (_, FlagValue::Invalid) => TriggerAction::Reject {
            reason: "trigger flag is not a boolean".into(),
        },
    }
}

/// Tracks the last seen flag value across notifications
#[derive(Debug, Default)]
pub struct TriggerStateMachine {
    last_seen: Option<FlagValue>,
    dispatch_count: u64,
}

impl TriggerStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value observed, if any
    pub fn last_seen(&self) -> Option<FlagValue> {
        self.last_seen
    }

    /// Number of dispatches requested so far
    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count
    }

    /// Process a notification and return the action to take
    pub fn on_notification(&mut self, value: &Value) -> TriggerAction {
        let current = FlagValue::from_value(value);
        let action = evaluate(self.last_seen, current);
        if action == TriggerAction::DispatchAndReset {
            self.dispatch_count += 1;
        }
        self.last_seen = Some(current);
        action
    }

    /// Whether the last notification was a repeated `true`
    pub fn is_repeat_set(&self, previous: Option<FlagValue>) -> bool {
        previous == Some(FlagValue::Set) && self.last_seen == Some(FlagValue::Set)
    }
}
