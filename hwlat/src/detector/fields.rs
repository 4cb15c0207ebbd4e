//! Abstract field → backend control file and unit translation.
//!
//! Pure mapping, no I/O. The public unit for every latency-valued field is
//! microseconds regardless of what the backend stores.
//!
//! | field     | tracer                          | hwlat_detector           | smi_detector                       |
//! |-----------|---------------------------------|--------------------------|------------------------------------|
//! | threshold | `tracing/tracing_thresh`        | `hwlat_detector/threshold` | `smi_detector/latency_threshold_us` |
//! | window    | `tracing/hwlat_detector/window` | `hwlat_detector/window`  | width + `ms_between_samples` (ms)  |
//! | width     | `tracing/hwlat_detector/width`  | `hwlat_detector/width`   | `smi_detector/ms_per_sample` (ms)  |
//! | enable    | `tracing/tracing_on`            | `hwlat_detector/enable`  | `smi_detector/enable`              |
//! | count     | computed                        | `hwlat_detector/count`   | `smi_detector/smi_count`           |
//! | max       | computed                        | `hwlat_detector/max`     | `smi_detector/max_sample_us`       |
//! | sample    | `tracing/trace_pipe`            | `hwlat_detector/sample`  | `smi_detector/sample_us`           |

use crate::domain::{Backend, DetectorError, Field, Result};

const US_PER_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Dimensionless (flags, counters)
    Count,
    Micros,
    Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    /// No control file; derived from collected samples
    Computed,
    /// The file holds the inter-sample interval; window = width + interval
    SyntheticWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub path: Option<&'static str>,
    pub unit: Unit,
    pub access: Access,
}

const fn rw(path: &'static str, unit: Unit) -> FieldSpec {
    FieldSpec { path: Some(path), unit, access: Access::ReadWrite }
}

const fn ro(path: &'static str, unit: Unit) -> FieldSpec {
    FieldSpec { path: Some(path), unit, access: Access::ReadOnly }
}

const COMPUTED: FieldSpec = FieldSpec { path: None, unit: Unit::Micros, access: Access::Computed };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTranslator {
    backend: Backend,
}

impl FieldTranslator {
    pub fn for_backend(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn spec(&self, field: Field) -> FieldSpec {
        use Unit::{Count, Micros, Millis};
        match (self.backend, field) {
            (Backend::Tracer, Field::Threshold) => rw("tracing/tracing_thresh", Micros),
            (Backend::Tracer, Field::Window) => rw("tracing/hwlat_detector/window", Micros),
            (Backend::Tracer, Field::Width) => rw("tracing/hwlat_detector/width", Micros),
            (Backend::Tracer, Field::Enable) => rw("tracing/tracing_on", Count),
            (Backend::Tracer, Field::Count | Field::Max) => COMPUTED,
            (Backend::Tracer, Field::Sample) => ro("tracing/trace_pipe", Micros),

            (Backend::HwlatModule, Field::Threshold) => rw("hwlat_detector/threshold", Micros),
            (Backend::HwlatModule, Field::Window) => rw("hwlat_detector/window", Micros),
            (Backend::HwlatModule, Field::Width) => rw("hwlat_detector/width", Micros),
            (Backend::HwlatModule, Field::Enable) => rw("hwlat_detector/enable", Count),
            (Backend::HwlatModule, Field::Count) => ro("hwlat_detector/count", Count),
            (Backend::HwlatModule, Field::Max) => ro("hwlat_detector/max", Micros),
            (Backend::HwlatModule, Field::Sample) => ro("hwlat_detector/sample", Micros),

            (Backend::SmiModule, Field::Threshold) => {
                rw("smi_detector/latency_threshold_us", Micros)
            }
            (Backend::SmiModule, Field::Window) => FieldSpec {
                path: Some("smi_detector/ms_between_samples"),
                unit: Millis,
                access: Access::SyntheticWindow,
            },
            (Backend::SmiModule, Field::Width) => rw("smi_detector/ms_per_sample", Millis),
            (Backend::SmiModule, Field::Enable) => rw("smi_detector/enable", Count),
            (Backend::SmiModule, Field::Count) => ro("smi_detector/smi_count", Count),
            (Backend::SmiModule, Field::Max) => ro("smi_detector/max_sample_us", Micros),
            (Backend::SmiModule, Field::Sample) => ro("smi_detector/sample_us", Micros),
        }
    }

    /// Control file for `field`, or `None` for fields computed client-side.
    pub fn to_path(&self, field: Field) -> Option<&'static str> {
        self.spec(field).path
    }

    /// Truncates to the backend's granularity; see [`Self::check_granularity`].
    pub fn to_backend_units(&self, field: Field, micros: u64) -> u64 {
        micros / self.granularity(field)
    }

    pub fn from_backend_units(&self, field: Field, raw: u64) -> u64 {
        raw.saturating_mul(self.granularity(field))
    }

    /// Smallest step, in microseconds, the backend can store for `field`.
    pub fn granularity(&self, field: Field) -> u64 {
        match self.spec(field).unit {
            Unit::Millis => US_PER_MS,
            Unit::Count | Unit::Micros => 1,
        }
    }

    /// Reject values the backend would silently truncate.
    pub fn check_granularity(&self, field: Field, micros: u64) -> Result<()> {
        let step = self.granularity(field);
        if micros % step == 0 {
            Ok(())
        } else {
            Err(DetectorError::Granularity { field, value: micros, step })
        }
    }

    pub fn has_synthetic_window(&self) -> bool {
        self.spec(Field::Window).access == Access::SyntheticWindow
    }

    /// Window in microseconds from the width and the raw interval file value.
    pub fn window_from_parts(&self, width_us: u64, raw_interval: u64) -> u64 {
        width_us.saturating_add(self.from_backend_units(Field::Window, raw_interval))
    }

    /// Raw interval value that makes the window `window_us` for the current width.
    pub fn interval_for_window(&self, window_us: u64, width_us: u64) -> Result<u64> {
        let idle = window_us
            .checked_sub(width_us)
            .filter(|&us| us > 0)
            .ok_or(DetectorError::InvalidWindow { window: window_us, width: width_us })?;
        let step = self.granularity(Field::Window);
        if idle % step != 0 {
            return Err(DetectorError::Granularity { field: Field::Window, value: window_us, step });
        }
        Ok(self.to_backend_units(Field::Window, idle))
    }
}
