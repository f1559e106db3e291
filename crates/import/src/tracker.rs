//! Per-job import progress tracking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::TrackerError;

/// Progress of one import job, as maxima seen at each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub source_max: Option<u64>,
    pub enqueued_max: Option<u64>,
    pub processed_max: Option<u64>,
}

/// Queue-side progress reported by an import job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub source_max: Option<u64>,
    pub enqueued_max: Option<u64>,
}

/// Records how far each import job has progressed.
#[async_trait]
pub trait JobTracker: Send + Sync {
    async fn get_status(&self, job_name: &str) -> Result<JobStatus, TrackerError>;

    async fn track_queue_status(
        &self,
        job_name: &str,
        status: QueueStatus,
    ) -> Result<(), TrackerError>;

    async fn track_processed_status(
        &self,
        job_name: &str,
        processed_max: u64,
    ) -> Result<(), TrackerError>;
}

fn max_wins(current: &mut Option<u64>, observed: Option<u64>) {
    if let Some(observed) = observed {
        *current = Some(current.map_or(observed, |current| current.max(observed)));
    }
}

#[derive(Debug, Default)]
struct InMemoryTrackerState {
    jobs: HashMap<String, JobStatus>,
    processed_calls: Vec<(String, u64)>,
    fail_on_track: bool,
}

/// In-memory job tracker. Every field only ever moves forward.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobTracker {
    state: Arc<RwLock<InMemoryTrackerState>>,
}

impl InMemoryJobTracker {
    /// Creates a new in-memory job tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the tracker to fail every update.
    pub async fn set_fail_on_track(&self, fail: bool) {
        self.state.write().await.fail_on_track = fail;
    }

    /// Returns every `track_processed_status` call, in order.
    pub async fn processed_calls(&self) -> Vec<(String, u64)> {
        self.state.read().await.processed_calls.clone()
    }
}

#[async_trait]
impl JobTracker for InMemoryJobTracker {
    async fn get_status(&self, job_name: &str) -> Result<JobStatus, TrackerError> {
        Ok(self
            .state
            .read()
            .await
            .jobs
            .get(job_name)
            .copied()
            .unwrap_or_default())
    }

    async fn track_queue_status(
        &self,
        job_name: &str,
        status: QueueStatus,
    ) -> Result<(), TrackerError> {
        let mut state = self.state.write().await;
        if state.fail_on_track {
            return Err(TrackerError::Unavailable("tracker configured to fail".to_string()));
        }

        let job = state.jobs.entry(job_name.to_string()).or_default();
        max_wins(&mut job.source_max, status.source_max);
        max_wins(&mut job.enqueued_max, status.enqueued_max);
        Ok(())
    }

    async fn track_processed_status(
        &self,
        job_name: &str,
        processed_max: u64,
    ) -> Result<(), TrackerError> {
        let mut state = self.state.write().await;
        if state.fail_on_track {
            return Err(TrackerError::Unavailable("tracker configured to fail".to_string()));
        }

        state
            .processed_calls
            .push((job_name.to_string(), processed_max));
        let job = state.jobs.entry(job_name.to_string()).or_default();
        max_wins(&mut job.processed_max, Some(processed_max));
        Ok(())
    }
}
