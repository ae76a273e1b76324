//! Domain module - Core entities and value objects of the scraping pipeline
//!
//! This module contains the product identifiers, marketplace catalogue,
//! scraped product records and the run-scoped bookkeeping that every
//! pipeline component shares.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod events;
pub mod identifier;
pub mod marketplace;
pub mod product;
pub mod run_state;

// Re-export commonly used items for convenience
pub use events::RunEvent;
pub use identifier::{Identifier, IdentifierError};
pub use marketplace::Marketplace;
pub use product::{
    BuyboxStatus, CandidateImage, DecodedImage, DedupeKey, ImageFormatKind, NormalizedImage,
    OutputRecord, ProductFields,
};
pub use run_state::{FailureRecord, PipelineRunState, RunSummary};
