//! JSON file metrics source
//!
//! Re-reads a snapshot file on every poll, so another process (or a person
//! at a shell) can update the counters while a sync loop runs. The file holds
//! a daily snapshot with an optional `usage` object next to it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::PauseError;
use crate::sources::MetricsSource;
use crate::types::{DailySnapshot, UsageSnapshot};

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    #[serde(flatten)]
    daily: DailySnapshot,
    #[serde(default)]
    usage: Option<UsageSnapshot>,
}

/// Metrics source backed by a JSON file
#[derive(Debug, Clone)]
pub struct FileMetricsSource {
    path: PathBuf,
}

impl FileMetricsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Option<SnapshotFile>, PauseError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "snapshot file not present");
                return Ok(None);
            }
            Err(err) => {
                return Err(PauseError::InvalidPayload(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    err
                )))
            }
        };

        Ok(Some(serde_json::from_str(&content)?))
    }
}

#[async_trait]
impl MetricsSource for FileMetricsSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn daily_snapshot(&self) -> Result<Option<DailySnapshot>, PauseError> {
        Ok(self.read().await?.map(|file| file.daily))
    }

    async fn usage_snapshot(&self) -> Result<Option<UsageSnapshot>, PauseError> {
        Ok(self.read().await?.and_then(|file| file.usage))
    }
}
