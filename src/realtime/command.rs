//! Lock commands and the single-slot lock mailbox

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

/// Where a lock command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockSource {
    Socket,
    /// Notification arrived while the app was in the foreground
    PushReceived,
    /// The user tapped a delivered notification
    PushResponse,
    /// Injected by the host (FFI, CLI)
    Host,
}

/// Supervised-lock state shown by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Unlocked,
    Locked,
}

impl LockState {
    pub fn from_locked(locked: bool) -> Self {
        if locked {
            LockState::Locked
        } else {
            LockState::Unlocked
        }
    }

    pub fn is_locked(self) -> bool {
        self == LockState::Locked
    }
}

/// A normalized "set lock state" instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockCommand {
    pub locked: bool,
    pub source: LockSource,
    /// Sender-side ordering marker (`ts`, epoch milliseconds) when present
    pub issued_at: Option<i64>,
    pub received_at: DateTime<Utc>,
}

/// Coerce a `locked` field: booleans and the strings "true"/"false".
/// Anything else is not a command.
pub fn coerce_locked(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) if text == "true" => Some(true),
        Value::String(text) if text == "false" => Some(false),
        _ => None,
    }
}

/// Read the optional `ts` ordering marker (number or numeric string)
fn issued_at(payload: &Value) -> Option<i64> {
    match payload.get("ts")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl LockCommand {
    pub fn new(locked: bool, source: LockSource) -> Self {
        Self {
            locked,
            source,
            issued_at: None,
            received_at: Utc::now(),
        }
    }

    /// Build from a payload carrying a `locked` field; `None` when the field
    /// is missing or not coercible.
    pub fn from_payload(payload: &Value, source: LockSource) -> Option<Self> {
        let locked = coerce_locked(payload.get("locked")?)?;
        Some(Self {
            locked,
            source,
            issued_at: issued_at(payload),
            received_at: Utc::now(),
        })
    }

    pub fn state(&self) -> LockState {
        LockState::from_locked(self.locked)
    }
}

/// Callback run by the UI side for every accepted command
pub type LockCallback = Arc<dyn Fn(bool) + Send + Sync>;

struct PublisherInner {
    tx: watch::Sender<LockState>,
    newest_issued: Mutex<Option<i64>>,
    callback: Option<LockCallback>,
}

/// Write side of the lock mailbox, handed to the delivery channels
#[derive(Clone)]
pub struct LockPublisher {
    inner: Arc<PublisherInner>,
}

impl LockPublisher {
    /// Apply a command. Last write wins, except that a command carrying an
    /// ordering marker older than one already applied is dropped. Returns
    /// whether the command was applied.
    pub fn publish(&self, command: LockCommand) -> bool {
        if let Some(issued) = command.issued_at {
            let mut newest = match self.inner.newest_issued.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if (*newest).is_some_and(|n| issued < n) {
                debug!(
                    issued,
                    source = ?command.source,
                    "dropping stale lock command"
                );
                return false;
            }
            *newest = Some(issued);
        }

        let state = command.state();
        self.inner.tx.send_replace(state);
        info!(locked = command.locked, source = ?command.source, "lock command applied");

        if let Some(callback) = &self.inner.callback {
            callback(command.locked);
        }
        true
    }
}

impl std::fmt::Debug for LockPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockPublisher")
            .field("has_callback", &self.inner.callback.is_some())
            .finish()
    }
}

/// Single-slot mailbox holding the latest lock state; owned by the UI layer
pub struct LockMailbox {
    publisher: LockPublisher,
    rx: watch::Receiver<LockState>,
}

impl Default for LockMailbox {
    fn default() -> Self {
        Self::new(LockState::Unlocked)
    }
}

impl LockMailbox {
    /// Mailbox seeded with the last known local value
    pub fn new(initial: LockState) -> Self {
        Self::build(initial, None)
    }

    pub fn with_callback<F>(initial: LockState, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        Self::build(initial, Some(Arc::new(callback)))
    }

    fn build(initial: LockState, callback: Option<LockCallback>) -> Self {
        let (tx, rx) = watch::channel(initial);
        Self {
            publisher: LockPublisher {
                inner: Arc::new(PublisherInner {
                    tx,
                    newest_issued: Mutex::new(None),
                    callback,
                }),
            },
            rx,
        }
    }

    pub fn state(&self) -> LockState {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.rx.clone()
    }

    pub fn publisher(&self) -> LockPublisher {
        self.publisher.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_coercion_table() {
        assert_eq!(coerce_locked(&json!(true)), Some(true));
        assert_eq!(coerce_locked(&json!("true")), Some(true));
        assert_eq!(coerce_locked(&json!(false)), Some(false));
        assert_eq!(coerce_locked(&json!("false")), Some(false));
        assert_eq!(coerce_locked(&json!("yes")), None);
        assert_eq!(coerce_locked(&json!("TRUE")), None);
        assert_eq!(coerce_locked(&json!(1)), None);
        assert_eq!(coerce_locked(&Value::Null), None);
    }

    #[test]
    fn test_command_from_payload() {
        let cmd = LockCommand::from_payload(&json!({"locked": "true", "ts": 17}), LockSource::Socket)
            .unwrap();
        assert!(cmd.locked);
        assert_eq!(cmd.issued_at, Some(17));

        assert!(LockCommand::from_payload(&json!({}), LockSource::Socket).is_none());
        assert!(LockCommand::from_payload(&json!({"locked": "maybe"}), LockSource::Socket).is_none());
        assert!(LockCommand::from_payload(&json!("locked"), LockSource::Socket).is_none());
    }

    #[test]
    fn test_mailbox_defaults_unlocked() {
        let mailbox = LockMailbox::default();
        assert_eq!(mailbox.state(), LockState::Unlocked);

        let seeded = LockMailbox::new(LockState::Locked);
        assert!(seeded.state().is_locked());
    }

    #[test]
    fn test_last_write_wins_and_callback_runs_per_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mailbox = LockMailbox::with_callback(LockState::Unlocked, move |locked| {
            sink.lock().unwrap().push(locked);
        });
        let publisher = mailbox.publisher();

        assert!(publisher.publish(LockCommand::new(true, LockSource::Socket)));
        assert!(publisher.publish(LockCommand::new(true, LockSource::PushReceived)));
        assert!(publisher.publish(LockCommand::new(false, LockSource::PushResponse)));

        assert_eq!(*seen.lock().unwrap(), vec![true, true, false]);
        assert_eq!(mailbox.state(), LockState::Unlocked);
    }

    #[test]
    fn test_stale_ordered_command_dropped() {
        let mailbox = LockMailbox::default();
        let publisher = mailbox.publisher();

        let newer = LockCommand::from_payload(&json!({"locked": true, "ts": 200}), LockSource::Socket)
            .unwrap();
        let older =
            LockCommand::from_payload(&json!({"locked": false, "ts": 100}), LockSource::PushReceived)
                .unwrap();

        assert!(publisher.publish(newer));
        assert!(!publisher.publish(older));
        assert_eq!(mailbox.state(), LockState::Locked);

        // Unordered commands always apply
        assert!(publisher.publish(LockCommand::new(false, LockSource::Host)));
        assert_eq!(mailbox.state(), LockState::Unlocked);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let mailbox = LockMailbox::default();
        let mut rx = mailbox.subscribe();
        mailbox.publisher().publish(LockCommand::new(true, LockSource::Socket));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), LockState::Locked);
    }
}
