//! Latency detector front end
//!
//! [`Detector`] is a closed set of backend variants behind one capability
//! surface (get, set, detect, save, display, cleanup). The variant is chosen at
//! construction by probing which backend's control path exists:
//!
//! 1. `hwlat` tracer (`tracing/hwlat_detector` in debugfs)
//! 2. `hwlat_detector` module
//! 3. `smi_detector` module

pub mod fields;
pub mod module;
pub mod samples;
mod session;
pub mod tracer;

use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::{BackendChoice, Config};
use crate::domain::{Backend, DetectorError, Field, Result, State};
use crate::preflight;
use crate::system::{DebugFs, Interrupt, ModuleLoader};

pub use fields::FieldTranslator;
pub use module::ModuleDetector;
pub use samples::{RunResult, Sample, SampleStore, TracerSample};
pub use tracer::TracerDetector;

use session::Session;

#[derive(Debug)]
pub enum Detector {
    Module(ModuleDetector),
    Tracer(TracerDetector),
}

enum Probe {
    Tracer,
    Module(ModuleLoader),
}

fn candidates(choice: BackendChoice) -> &'static [Backend] {
    match choice {
        BackendChoice::Auto => &[Backend::Tracer, Backend::HwlatModule, Backend::SmiModule],
        BackendChoice::Tracer => &[Backend::Tracer],
        BackendChoice::Module => &[Backend::HwlatModule, Backend::SmiModule],
    }
}

/// Find `backend`, loading its module if needed. A module without a control
/// directory is unloaded again (when ours) and reported unavailable.
fn probe(backend: Backend, fs: &DebugFs, config: &Config) -> Result<Probe> {
    let Some(name) = backend.module_name() else {
        return if fs.exists(tracer::TRACER_DIR) {
            Ok(Probe::Tracer)
        } else {
            Err(DetectorError::unavailable(backend.name(), "hwlat tracer not available"))
        };
    };

    let mut kmod = ModuleLoader::probe(name, config)?;
    kmod.load()?;
    if fs.exists(backend.name()) {
        return Ok(Probe::Module(kmod));
    }
    if let Err(e) = kmod.unload() {
        warn!("{e}");
    }
    Err(DetectorError::unavailable(
        backend.name(),
        format!("{} has no {} directory", fs.mountpoint().display(), backend.name()),
    ))
}

impl Detector {
    /// Acquire debugfs (and the module, for module backends) and select a backend.
    ///
    /// # Errors
    /// - `NotRoot` when root is required and missing
    /// - `MountFailed` / `ModuleLoadFailed` on setup failure
    /// - `BackendUnavailable` when no candidate backend exists
    pub fn open(config: Config, interrupt: Interrupt) -> Result<Self> {
        if config.require_root && !preflight::is_root() {
            return Err(DetectorError::NotRoot);
        }
        let mut fs = DebugFs::mount(&config)?;

        let mut reasons = Vec::new();
        for &backend in candidates(config.backend) {
            match probe(backend, &fs, &config) {
                Ok(found) => {
                    info!("selected {backend} backend");
                    let session = Session::new(fs, backend, config, interrupt);
                    return match found {
                        Probe::Tracer => TracerDetector::open(session).map(Detector::Tracer),
                        Probe::Module(kmod) => Ok(Detector::Module(ModuleDetector::new(session, kmod))),
                    };
                }
                Err(e) if e.is_backend_unavailable() => {
                    debug!("{e}");
                    reasons.push(e.to_string());
                }
                Err(e) => {
                    let _ = fs.unmount();
                    return Err(e);
                }
            }
        }

        fs.unmount()?;
        Err(DetectorError::unavailable("hardware latency", reasons.join("; ")))
    }

    pub fn backend(&self) -> Backend {
        match self {
            Detector::Module(d) => d.backend(),
            Detector::Tracer(d) => d.backend(),
        }
    }

    pub fn state(&self) -> State {
        match self {
            Detector::Module(d) => d.state(),
            Detector::Tracer(d) => d.state(),
        }
    }

    /// Field value in microseconds (counts and flags are plain integers).
    pub fn get(&self, field: Field) -> Result<u64> {
        match self {
            Detector::Module(d) => d.get(field),
            Detector::Tracer(d) => d.get(field),
        }
    }

    pub fn set(&mut self, field: Field, value: u64) -> Result<()> {
        match self {
            Detector::Module(d) => d.set(field, value),
            Detector::Tracer(d) => d.set(field, value),
        }
    }

    /// Set the sample width, widening the window to twice the width if the
    /// width would not fit.
    pub fn set_width(&mut self, width: u64) -> Result<()> {
        let widened = if width > self.get(Field::Window)? {
            let window = width.checked_mul(2).ok_or(DetectorError::OutOfRange { field: Field::Width, value: width })?;
            debug!("widening window to {window} for new width of {width}");
            Some(window)
        } else {
            None
        };
        let synthetic = self.translator().has_synthetic_window();

        // A real window file must exceed the width at every step; a synthetic
        // window is derived from the width, so width goes first.
        if let (Some(window), false) = (widened, synthetic) {
            self.set(Field::Window, window)?;
        }
        self.set(Field::Width, width)?;
        if let (Some(window), true) = (widened, synthetic) {
            self.set(Field::Window, window)?;
        }
        Ok(())
    }

    /// Set the sampling window, halving the width first if it would not fit.
    /// The halved width is rounded down to what the backend can store.
    pub fn set_window(&mut self, window: u64) -> Result<()> {
        if window < self.get(Field::Width)? {
            let step = self.translator().granularity(Field::Width);
            let width = window / 2 / step * step;
            debug!("shrinking width to {width} for new window of {window}");
            self.set(Field::Width, width)?;
        }
        self.set(Field::Window, window)
    }

    pub fn translator(&self) -> FieldTranslator {
        FieldTranslator::for_backend(self.backend())
    }

    /// Run one measurement for `duration`. An interrupt ends the run early;
    /// samples collected up to that point are still returned.
    pub fn detect(&mut self, duration: Duration) -> Result<RunResult> {
        match self {
            Detector::Module(d) => d.detect(duration),
            Detector::Tracer(d) => d.detect(duration),
        }
    }

    /// Samples from the most recent run.
    pub fn samples(&self) -> &SampleStore {
        match self {
            Detector::Module(d) => d.samples(),
            Detector::Tracer(d) => d.samples(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.samples().save(path)
    }

    pub fn display(&self) {
        self.samples().display();
    }

    /// Release everything this process set up. Idempotent.
    pub fn cleanup(&mut self) -> Result<()> {
        match self {
            Detector::Module(d) => d.cleanup(),
            Detector::Tracer(d) => d.cleanup(),
        }
    }

    /// Unload the module and unmount debugfs regardless of who set them up.
    pub fn force_cleanup(&mut self) -> Result<()> {
        match self {
            Detector::Module(d) => d.force_cleanup(),
            Detector::Tracer(d) => d.force_cleanup(),
        }
    }
}
