//! Structured error types for hwlat
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! "No sample ready yet" is never an error: non-blocking reads return `Ok(None)`.

use std::path::PathBuf;

use thiserror::Error;

use super::types::{Backend, Field, State};

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Permission denied: hwlat requires root privileges to drive the latency detector (run with sudo)")]
    NotRoot,

    #[error("Failed to mount debugfs at {0}")]
    MountFailed(PathBuf),

    #[error("Failed to unmount debugfs at {0}")]
    UnmountFailed(PathBuf),

    #[error("Failed to load kernel module {0}")]
    ModuleLoadFailed(String),

    #[error("Failed to unload kernel module {0}")]
    ModuleUnloadFailed(String),

    #[error("{backend} detector not available: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Failed to parse {what}: {input:?}")]
    Parse { what: &'static str, input: String },

    #[error("Invalid window {window}us for sample width {width}us")]
    InvalidWindow { window: u64, width: u64 },

    #[error("{field} value {value}us is not a multiple of {step}us on this backend")]
    Granularity { field: Field, value: u64, step: u64 },

    #[error("{field} value {value}us is out of range")]
    OutOfRange { field: Field, value: u64 },

    #[error("{field} did not read back {value} after {attempts} attempts")]
    ConfirmationTimeout { field: Field, value: u64, attempts: u32 },

    #[error("Interrupted while waiting for {0} to take effect")]
    Interrupted(Field),

    #[error("Cannot {op} a detector in state {state:?}")]
    InvalidState { op: &'static str, state: State },

    #[error("Field {field} is not writable on the {backend} backend")]
    ReadOnlyField { field: Field, backend: Backend },

    #[error("Cleanup failed ({})", teardown_summary(.unload.as_deref(), .unmount.as_deref()))]
    Teardown { unload: Option<String>, unmount: Option<String> },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DetectorError {
    /// Errors that abort before any measurement starts.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::NotRoot | Self::MountFailed(_) | Self::ModuleLoadFailed(_)
        )
    }

    /// A backend is missing; callers may retry with another one.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// Missing privileges, whether detected up front or reported by the kernel.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::NotRoot => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    pub(crate) fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable { backend: backend.into(), reason: reason.into() }
    }
}

fn teardown_summary(unload: Option<&str>, unmount: Option<&str>) -> String {
    match (unload, unmount) {
        (Some(a), Some(b)) => format!("{a}; {b}"),
        (Some(a), None) | (None, Some(a)) => a.to_string(),
        (None, None) => "unknown".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write report file: {0}")]
    WriteFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
