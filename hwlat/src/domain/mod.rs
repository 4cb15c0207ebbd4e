//! Domain model for hwlat
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via enums for fields, backends and ownership
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{Backend, CpuId, Field, Ownership, State};

pub use errors::{DetectorError, ExportError, Result};
