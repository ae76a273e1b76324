//! Application layer module
//!
//! This module contains the run orchestration that ties the domain types
//! to the infrastructure adapters.

pub mod scrape_pipeline;

pub use scrape_pipeline::{IdentifierFailure, PipelineError, RunHandle, ScrapePipeline};
