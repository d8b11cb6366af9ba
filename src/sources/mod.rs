//! Metrics sources
//!
//! A metrics source yields today's cumulative interaction counters and, when
//! the platform allows it, per-app foreground usage. Platforms without the
//! capability are represented by [`MetricsCapability::Unsupported`] instead of
//! runtime platform checks inside the sync loop.

pub mod aggregator;
pub mod file;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PauseError;
use crate::types::{DailySnapshot, UsageSnapshot};

pub use aggregator::InteractionAggregator;
pub use file::FileMetricsSource;

/// Provider of daily snapshots
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Current daily interaction snapshot; `None` when nothing can be read
    async fn daily_snapshot(&self) -> Result<Option<DailySnapshot>, PauseError>;

    /// Current per-app usage snapshot; `None` when usage access is missing
    async fn usage_snapshot(&self) -> Result<Option<UsageSnapshot>, PauseError> {
        Ok(None)
    }
}

/// Whether this platform can provide metrics at all
#[derive(Clone)]
pub enum MetricsCapability {
    Supported(Arc<dyn MetricsSource>),
    Unsupported { reason: String },
}

impl MetricsCapability {
    pub fn supported<S: MetricsSource + 'static>(source: S) -> Self {
        MetricsCapability::Supported(Arc::new(source))
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        MetricsCapability::Unsupported {
            reason: reason.into(),
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, MetricsCapability::Supported(_))
    }

    pub fn source(&self) -> Option<&Arc<dyn MetricsSource>> {
        match self {
            MetricsCapability::Supported(source) => Some(source),
            MetricsCapability::Unsupported { .. } => None,
        }
    }

    /// Source, or [`PauseError::Unsupported`] with the recorded reason
    pub fn require(&self) -> Result<&Arc<dyn MetricsSource>, PauseError> {
        match self {
            MetricsCapability::Supported(source) => Ok(source),
            MetricsCapability::Unsupported { reason } => {
                Err(PauseError::Unsupported(reason.clone()))
            }
        }
    }
}

impl std::fmt::Debug for MetricsCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsCapability::Supported(source) => {
                f.debug_tuple("Supported").field(&source.name()).finish()
            }
            MetricsCapability::Unsupported { reason } => {
                f.debug_struct("Unsupported").field("reason", reason).finish()
            }
        }
    }
}
