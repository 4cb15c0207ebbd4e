//! Command-line interface

pub mod args;
pub mod units;

pub use args::Args;
pub use units::{parse_micros, parse_seconds};
