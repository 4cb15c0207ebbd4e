//! Domain types providing compile-time safety and self-documentation
//!
//! Abstract control fields, backend identities, resource ownership and the
//! detector lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Abstract control field, independent of backend file layout and units.
///
/// All latency-valued fields are expressed in microseconds at this level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Threshold,
    Window,
    Width,
    Enable,
    Count,
    Max,
    Sample,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Threshold,
        Field::Window,
        Field::Width,
        Field::Enable,
        Field::Count,
        Field::Max,
        Field::Sample,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Threshold => "threshold",
            Field::Window => "window",
            Field::Width => "width",
            Field::Enable => "enable",
            Field::Count => "count",
            Field::Max => "max",
            Field::Sample => "sample",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| format!("unknown field '{s}'"))
    }
}

/// Kernel facility driving the measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// The `hwlat` ftrace tracer, read through `trace_pipe`
    Tracer,
    /// The `hwlat_detector` loadable module (microsecond units)
    HwlatModule,
    /// The legacy `smi_detector` loadable module (millisecond width/window)
    SmiModule,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Tracer => "hwlat",
            Backend::HwlatModule => "hwlat_detector",
            Backend::SmiModule => "smi_detector",
        }
    }

    /// Kernel module name, for module-based backends.
    pub fn module_name(self) -> Option<&'static str> {
        match self {
            Backend::Tracer => None,
            Backend::HwlatModule | Backend::SmiModule => Some(self.name()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who is responsible for tearing a shared resource down.
///
/// A resource found already in place is left as it was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    NotOwned,
    OwnedByUs,
}

impl Ownership {
    pub fn is_owned(self) -> bool {
        self == Ownership::OwnedByUs
    }
}

/// Detector lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Resources acquired, backend setup not finished
    Constructed,
    Configured,
    Running,
    Stopped,
    Cleaned,
}

/// CPU ID
///
/// Represents a CPU core ID (0, 1, 2, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu {}", self.0)
    }
}
