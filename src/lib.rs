//! MindPause - client-side digital wellbeing pipeline
//!
//! MindPause turns daily phone interaction counts into escalating "take a
//! pause" reminders and listens for remote lock commands:
//! metrics source → backend report → escalation gate → local notification.
//!
//! ## Modules
//!
//! - **Sync**: Periodic fetch/report/evaluate loop driven by a timer and app resume
//! - **Escalation**: Pure risk evaluator plus the once-per-tier-per-day gate
//! - **Realtime**: Socket.IO and push-data lock commands feeding one lock mailbox

pub mod api;
pub mod config;
pub mod error;
pub mod escalation;
pub mod notify;
pub mod presentation;
pub mod realtime;
pub mod sources;
pub mod sync;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use api::{HttpMetricsApi, MetricsApi};
pub use config::PauseConfig;
pub use error::PauseError;
pub use escalation::{evaluate, Escalation, EscalationState, RiskLevel};
pub use notify::{LogNotifier, Notifier};
pub use presentation::RiskBreakdown;
pub use sources::{FileMetricsSource, InteractionAggregator, MetricsCapability, MetricsSource};
pub use sync::{SyncHandle, SyncLoop, TickOutcome};
pub use types::{AppState, DailySnapshot, UsageSnapshot};

// Realtime exports
pub use realtime::{LockMailbox, LockState, PushEvent, PushInbox, RealtimeListener};

/// MindPause version, sent as part of the HTTP user agent
pub const MINDPAUSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in user agents and logs
pub const PRODUCER_NAME: &str = "mindpause";
