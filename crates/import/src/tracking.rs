//! Per-message import progress.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    /// A job name was given without a positive progress value.
    #[error("Tracking for job '{job_name}' requires a positive progress")]
    MissingProgress { job_name: String },
}

/// Which import job produced a message, and how far that job had read.
///
/// A job name always comes with a strictly positive progress, including
/// when deserialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTracking")]
pub struct Tracking {
    #[serde(skip_serializing_if = "Option::is_none")]
    job_name: Option<String>,
    progress: u64,
}

impl Tracking {
    pub fn new(job_name: Option<String>, progress: u64) -> Result<Self, TrackingError> {
        if let Some(job_name) = &job_name
            && progress == 0
        {
            return Err(TrackingError::MissingProgress {
                job_name: job_name.clone(),
            });
        }
        Ok(Self { job_name, progress })
    }

    /// Tracking for a message produced by `job_name` at `progress`.
    pub fn for_job(job_name: impl Into<String>, progress: u64) -> Result<Self, TrackingError> {
        Self::new(Some(job_name.into()), progress)
    }

    /// Tracking for a message that belongs to no job.
    pub fn untracked() -> Self {
        Self::default()
    }

    pub fn job_name(&self) -> Option<&str> {
        self.job_name.as_deref()
    }

    pub fn progress(&self) -> u64 {
        self.progress
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTracking {
    #[serde(default)]
    job_name: Option<String>,
    #[serde(default)]
    progress: u64,
}

impl TryFrom<RawTracking> for Tracking {
    type Error = TrackingError;

    fn try_from(raw: RawTracking) -> Result<Self, Self::Error> {
        Self::new(raw.job_name, raw.progress)
    }
}
