//! Local notification surface
//!
//! The host platform implements [`Notifier`]; the sync loop only decides
//! when to call it and with which content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::error::PauseError;
use crate::escalation::{Escalation, RiskLevel};

/// Notification priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Default,
    High,
}

/// Android channel metadata (grouping and importance)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: Priority,
    pub vibration_pattern_ms: Vec<u64>,
    pub light_color: String,
}

impl NotificationChannel {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            id: config.channel_id.clone(),
            name: config.channel_name.clone(),
            importance: Priority::High,
            vibration_pattern_ms: vec![0, 250, 250, 250],
            light_color: "#FF231F7C".to_string(),
        }
    }
}

/// Data attached to a notification for tap-through navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub route: String,
    pub level: RiskLevel,
}

/// A local notification ready to be scheduled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalNotification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub sound: bool,
    pub priority: Priority,
    pub channel_id: String,
    pub data: NotificationData,
}

impl LocalNotification {
    /// Reminder for an escalation tier
    pub fn for_escalation(escalation: &Escalation, config: &NotificationConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: escalation.title.clone(),
            body: escalation.body.clone(),
            sound: true,
            priority: Priority::High,
            channel_id: config.channel_id.clone(),
            data: NotificationData {
                route: config.route.clone(),
                level: escalation.level,
            },
        }
    }
}

/// Platform notification capability
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn permission_granted(&self) -> Result<bool, PauseError>;

    /// Ask the user; returns whether permission is now granted
    async fn request_permission(&self) -> Result<bool, PauseError>;

    async fn ensure_channel(&self, channel: &NotificationChannel) -> Result<(), PauseError>;

    async fn schedule(&self, notification: &LocalNotification) -> Result<(), PauseError>;
}

/// Notifier that writes reminders to the log; used on desktop and by the CLI
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn permission_granted(&self) -> Result<bool, PauseError> {
        Ok(true)
    }

    async fn request_permission(&self) -> Result<bool, PauseError> {
        Ok(true)
    }

    async fn ensure_channel(&self, _channel: &NotificationChannel) -> Result<(), PauseError> {
        Ok(())
    }

    async fn schedule(&self, notification: &LocalNotification) -> Result<(), PauseError> {
        info!(
            id = %notification.id,
            level = notification.data.level.as_u8(),
            channel = %notification.channel_id,
            title = %notification.title,
            body = %notification.body,
            "escalation reminder"
        );
        Ok(())
    }
}
