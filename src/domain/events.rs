//! Run events streamed from the pipeline to whatever front end is listening
//!
//! The pipeline runs on its own task and pushes these over an unbounded
//! channel; the consumer decides how to present them.

use serde::{Deserialize, Serialize};

use super::run_state::RunSummary;

/// Progress notification emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Authentication confirmed, about to process `total` input rows
    RunStarted { run_id: String, total: usize },
    /// Blocked waiting for the operator to sign in
    AwaitingAuthentication,
    /// Work on one identifier began (`index` is 1-based)
    IdentifierStarted {
        index: usize,
        total: usize,
        identifier: String,
    },
    /// A page-load attempt failed and may be retried
    AttemptFailed {
        identifier: String,
        attempt: u32,
        reason: String,
    },
    /// Row written for the identifier
    IdentifierProcessed {
        identifier: String,
        images: usize,
        percent: f64,
    },
    /// Identifier abandoned; the run continues
    IdentifierFailed { identifier: String, reason: String },
    /// Blank or malformed input row
    IdentifierSkipped { index: usize, reason: String },
    RunFinished(RunSummary),
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished(_))
    }
}
