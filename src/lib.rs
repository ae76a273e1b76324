//! Product Gallery Scraper - per-identifier product data and image gallery extraction
//!
//! Product pages are rendered in an already running browser, the gallery is
//! extracted and normalized, and every identifier becomes one spreadsheet
//! row with embedded thumbnails.

// Module declarations
pub mod application;
pub mod commands;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
pub mod test_utils;
