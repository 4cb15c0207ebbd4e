//! Report export functionality
//!
//! Currently supports a JSON run report for archiving and post-processing.

pub mod json_report;

pub use json_report::{JsonReport, RunParameters};
