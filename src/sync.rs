//! Sync loop
//!
//! Periodically pulls the daily snapshot, reports it to the backend, runs the
//! escalation evaluator and, when the gate allows it, emits a local reminder.
//!
//! Triggers: once on start, on every resume (background/inactive to active),
//! on a fixed interval, and on demand through [`SyncHandle::trigger_now`].
//! A failed tick is logged and simply retried at the next trigger.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::MetricsApi;
use crate::config::{NotificationConfig, SyncConfig};
use crate::error::PauseError;
use crate::escalation::{evaluate, Escalation, EscalationState, RiskLevel};
use crate::notify::{LocalNotification, NotificationChannel, Notifier};
use crate::sources::MetricsCapability;
use crate::types::{AppState, DailySnapshot};

/// Result of one sync tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No snapshot could be read on this platform
    Unsupported,
    /// The metrics source failed; nothing else ran
    FetchFailed,
    Evaluated {
        level: RiskLevel,
        reported: bool,
        notified: bool,
    },
}

/// Orchestrates fetch → report → evaluate → maybe-notify
pub struct SyncLoop {
    user_id: String,
    metrics: MetricsCapability,
    api: Arc<dyn MetricsApi>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    notifications: NotificationConfig,
    state: Mutex<EscalationState>,
}

impl SyncLoop {
    pub fn new(
        user_id: impl Into<String>,
        metrics: MetricsCapability,
        api: Arc<dyn MetricsApi>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
        notifications: NotificationConfig,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            metrics,
            api,
            notifier,
            config,
            notifications,
            state: Mutex::new(EscalationState::new()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Copy of the current escalation gate
    pub fn escalation_state(&self) -> EscalationState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, EscalationState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run one tick. Never fails; errors are logged.
    pub async fn tick(&self) -> TickOutcome {
        // Step 1: fetch
        let source = match self.metrics.require() {
            Ok(source) => source,
            Err(err) => {
                debug!(error = %err, "skipping tick");
                return TickOutcome::Unsupported;
            }
        };

        let snapshot = match source.daily_snapshot().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                debug!(source = source.name(), "no snapshot available");
                return TickOutcome::Unsupported;
            }
            Err(err) => {
                warn!(source = source.name(), error = %err, kind = err.label(), "snapshot fetch failed");
                return TickOutcome::FetchFailed;
            }
        };

        // Step 2: report
        let reported = self.report(&snapshot).await;

        // Step 3: evaluate
        let escalation = evaluate(&snapshot);
        debug!(
            date = %snapshot.record_date,
            total = snapshot.total_interactions(),
            level = escalation.level.as_u8(),
            "snapshot evaluated"
        );

        // Step 4: maybe notify
        let notified = self.maybe_notify(&snapshot.record_date, &escalation).await;

        TickOutcome::Evaluated {
            level: escalation.level,
            reported,
            notified,
        }
    }

    async fn report(&self, snapshot: &DailySnapshot) -> bool {
        let mut reported = match self.api.post_interactions(&self.user_id, snapshot).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, kind = err.label(), "interaction report failed");
                false
            }
        };

        if !self.config.report_usage {
            return reported;
        }

        let Some(source) = self.metrics.source() else {
            return reported;
        };

        match source.usage_snapshot().await {
            Ok(Some(usage)) => {
                if let Err(err) = self.api.post_usage(&self.user_id, &usage).await {
                    warn!(error = %err, kind = err.label(), "usage report failed");
                    reported = false;
                }
            }
            Ok(None) => debug!("usage access unavailable, skipping usage report"),
            Err(err) => warn!(error = %err, "usage snapshot failed"),
        }

        reported
    }

    async fn maybe_notify(&self, date: &str, escalation: &Escalation) -> bool {
        // Check-and-claim under one lock so overlapping ticks cannot both fire
        let previous = {
            let mut state = self.lock_state();
            let previous = state.clone();
            if !state.observe(date, escalation) {
                return false;
            }
            previous
        };

        match self.emit(escalation).await {
            Ok(()) => {
                info!(date, level = escalation.level.as_u8(), "escalation reminder sent");
                true
            }
            Err(PauseError::PermissionDenied(what)) => {
                info!(level = escalation.level.as_u8(), %what, "permission denied, reminder skipped");
                self.lock_state().revert(date, escalation.level, previous);
                false
            }
            Err(err) => {
                warn!(error = %err, kind = err.label(), "escalation reminder failed");
                self.lock_state().revert(date, escalation.level, previous);
                false
            }
        }
    }

    /// Fails with [`PauseError::PermissionDenied`] when the user refuses
    async fn emit(&self, escalation: &Escalation) -> Result<(), PauseError> {
        let mut granted = self.notifier.permission_granted().await?;
        if !granted {
            granted = self.notifier.request_permission().await?;
        }
        if !granted {
            return Err(PauseError::PermissionDenied("notifications".to_string()));
        }

        self.notifier
            .ensure_channel(&NotificationChannel::from_config(&self.notifications))
            .await?;
        self.notifier
            .schedule(&LocalNotification::for_escalation(escalation, &self.notifications))
            .await?;
        Ok(())
    }

    /// Start the loop on the current tokio runtime
    pub fn spawn(self: Arc<Self>, initial_state: AppState) -> SyncHandle {
        let cancel = CancellationToken::new();
        let (app_state_tx, app_state_rx) = watch::channel(initial_state);
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_loop(self, cancel.clone(), app_state_rx, trigger_rx));

        SyncHandle {
            cancel,
            app_state_tx,
            trigger_tx,
            task: Some(task),
        }
    }
}

async fn run_loop(
    sync: Arc<SyncLoop>,
    cancel: CancellationToken,
    mut app_state_rx: watch::Receiver<AppState>,
    mut trigger_rx: mpsc::UnboundedReceiver<()>,
) {
    // The first interval tick completes immediately, which covers the
    // run-on-start trigger.
    let mut ticker = tokio::time::interval(sync.config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_state = *app_state_rx.borrow_and_update();

    info!(
        user_id = %sync.user_id,
        interval_secs = sync.config.interval().as_secs(),
        "sync loop started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let outcome = sync.tick().await;
                debug!(?outcome, trigger = "interval", "sync tick finished");
            }
            changed = app_state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = *app_state_rx.borrow_and_update();
                if last_state.is_resume_to(next) {
                    let outcome = sync.tick().await;
                    debug!(?outcome, trigger = "resume", "sync tick finished");
                }
                last_state = next;
            }
            Some(()) = trigger_rx.recv() => {
                let outcome = sync.tick().await;
                debug!(?outcome, trigger = "manual", "sync tick finished");
            }
        }
    }

    info!("sync loop stopped");
}

/// Control handle for a spawned [`SyncLoop`]; dropping it stops the loop
pub struct SyncHandle {
    cancel: CancellationToken,
    app_state_tx: watch::Sender<AppState>,
    trigger_tx: mpsc::UnboundedSender<()>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Report an app lifecycle change from the host
    pub fn app_state_changed(&self, state: AppState) {
        self.app_state_tx.send_replace(state);
    }

    /// Request an extra tick
    pub fn trigger_now(&self) {
        let _ = self.trigger_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop scheduling ticks and wait for an in-flight tick to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "sync loop task ended abnormally");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
