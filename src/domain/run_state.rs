//! Run-scoped bookkeeping
//!
//! One [`PipelineRunState`] exists per run. It is created when the run starts,
//! mutated only by the pipeline task, and finalized into a [`RunSummary`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why an identifier produced no row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub identifier: String,
    pub reason: String,
}

/// Counters for an in-flight run
#[derive(Debug, Clone)]
pub struct PipelineRunState {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub rows_written: usize,
    pub images_embedded: usize,
    pub images_rejected: usize,
    pub failures: Vec<FailureRecord>,
    pub cancelled: bool,
}

impl PipelineRunState {
    pub fn new(total: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            total,
            processed: 0,
            skipped: 0,
            rows_written: 0,
            images_embedded: 0,
            images_rejected: 0,
            failures: Vec::new(),
            cancelled: false,
        }
    }

    pub fn record_success(&mut self, embedded: usize, rejected: usize) {
        self.processed += 1;
        self.rows_written += 1;
        self.images_embedded += embedded;
        self.images_rejected += rejected;
    }

    pub fn record_failure(&mut self, identifier: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(FailureRecord {
            identifier: identifier.into(),
            reason: reason.into(),
        });
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// Rows handled so far (processed, failed or skipped)
    pub fn handled(&self) -> usize {
        self.processed + self.failures.len() + self.skipped
    }

    /// Completion percentage over the total input, 0.0 when the input is empty
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.handled() as f64 / self.total as f64) * 100.0
    }

    pub fn finish(self, output_path: Option<PathBuf>) -> RunSummary {
        let duration_ms = (Utc::now() - self.started_at).num_milliseconds().max(0) as u64;
        RunSummary {
            run_id: self.run_id,
            total: self.total,
            processed: self.processed,
            failed: self.failures.len(),
            skipped: self.skipped,
            rows_written: self.rows_written,
            images_embedded: self.images_embedded,
            images_rejected: self.images_rejected,
            failures: self.failures,
            output_path,
            cancelled: self.cancelled,
            duration_ms,
        }
    }
}

/// Final report of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rows_written: usize,
    pub images_embedded: usize,
    pub images_rejected: usize,
    pub failures: Vec<FailureRecord>,
    pub output_path: Option<PathBuf>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    /// `"processed/total"` line for the operator
    pub fn headline(&self) -> String {
        format!("{}/{} products processed", self.processed, self.total)
    }
}
