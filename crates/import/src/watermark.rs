//! Per-batch maximum progress per job.

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

/// Highest progress seen for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub job_name: String,
    pub progress: u64,
}

/// Fixed-capacity job → maximum progress map over borrowed storage.
///
/// A batch of K messages touches at most K jobs, so lookups are a linear
/// scan and the capacity is the batch length. Growing past it is an error.
#[derive(Debug)]
pub struct WatermarkBuffer<'a> {
    entries: &'a mut Vec<Watermark>,
    capacity: usize,
}

impl<'a> WatermarkBuffer<'a> {
    /// Wraps `entries`, clearing it first.
    pub fn new(entries: &'a mut Vec<Watermark>, capacity: usize) -> Self {
        entries.clear();
        Self { entries, capacity }
    }

    /// Records `progress` for `job_name`; the maximum wins.
    pub fn record(&mut self, job_name: &str, progress: u64) -> Result<()> {
        if let Some(entry) = self.entries.iter_mut().find(|w| w.job_name == job_name) {
            if progress > entry.progress {
                entry.progress = progress;
            }
            return Ok(());
        }

        if self.entries.len() >= self.capacity {
            return Err(ImportError::WatermarkCapacity {
                capacity: self.capacity,
            });
        }
        self.entries.push(Watermark {
            job_name: job_name.to_string(),
            progress,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[Watermark] {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
