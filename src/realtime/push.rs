//! Push-data channel
//!
//! The host forwards notification data payloads here: one stream for
//! notifications that arrive while the app is foregrounded and one for the
//! user's response to a delivered notification. Payloads carrying the lock
//! marker become lock commands.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::realtime::command::{LockCommand, LockPublisher, LockSource};

/// `cmd` value marking a lock instruction
pub const LOCK_COMMAND_MARKER: &str = "lock_device";

/// Notification data payload as delivered by the platform
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Arrived while the app was in the foreground
    Received(Value),
    /// The user tapped a delivered notification
    Response(Value),
}

impl PushEvent {
    fn parts(&self) -> (&Value, LockSource) {
        match self {
            PushEvent::Received(data) => (data, LockSource::PushReceived),
            PushEvent::Response(data) => (data, LockSource::PushResponse),
        }
    }

    /// Lock command carried by this payload, if any
    pub fn lock_command(&self) -> Option<LockCommand> {
        let (data, source) = self.parts();
        if data.get("cmd").and_then(Value::as_str) != Some(LOCK_COMMAND_MARKER) {
            return None;
        }
        LockCommand::from_payload(data, source)
    }
}

/// Entry point the host uses to hand over push payloads
///
/// Deliveries while no listener is attached are dropped.
#[derive(Debug, Clone, Default)]
pub struct PushInbox {
    slot: Arc<Mutex<Option<mpsc::UnboundedSender<PushEvent>>>>,
}

impl PushInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward a payload; returns whether a listener was attached
    pub fn deliver(&self, event: PushEvent) -> bool {
        let slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                debug!("push payload dropped, no listener attached");
                false
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }

    /// Install a fresh listener, replacing any previous one
    pub(crate) fn attach(&self) -> mpsc::UnboundedReceiver<PushEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(tx);
        }
        rx
    }

    pub(crate) fn detach(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

/// Consume push payloads until cancelled or the inbox detaches
pub async fn run_push_channel(
    mut rx: mpsc::UnboundedReceiver<PushEvent>,
    publisher: LockPublisher,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = rx.recv() => match event {
                Some(event) => event,
                None => return,
            },
        };

        match event.lock_command() {
            Some(command) => {
                publisher.publish(command);
            }
            None => debug!(?event, "push payload without lock command"),
        }
    }
}
