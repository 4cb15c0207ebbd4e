//! Detector backed by a loadable kernel module (`hwlat_detector` or `smi_detector`).
//!
//! Each non-blocking read of the sample file yields the samples produced since
//! the previous read, one decimal microsecond value per line. `count` and `max`
//! are counters maintained by the module itself.

use std::time::Duration;

use log::{debug, warn};

use super::samples::{RunResult, Sample, SampleStore};
use super::session::Session;
use crate::domain::{Backend, Field, Result, State};
use crate::system::{DebugFs, ModuleLoader};

#[derive(Debug)]
pub struct ModuleDetector {
    session: Session,
    kmod: ModuleLoader,
    samples: SampleStore,
}

impl ModuleDetector {
    /// Wrap a loaded module whose control directory is already known to exist.
    pub(crate) fn new(mut session: Session, kmod: ModuleLoader) -> Self {
        session.configured();
        debug!("using {} module ({:?})", session.translator().backend(), kmod.origin());
        Self { session, kmod, samples: SampleStore::new() }
    }

    pub fn backend(&self) -> Backend {
        self.session.translator().backend()
    }

    pub fn module(&self) -> &ModuleLoader {
        &self.kmod
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    pub fn get(&self, field: Field) -> Result<u64> {
        self.session.get(field)
    }

    pub fn set(&mut self, field: Field, value: u64) -> Result<()> {
        self.session.set(field, value)
    }

    /// Read one batch of pending samples. `Ok(None)` means nothing is ready.
    pub fn get_sample(&self) -> Result<Option<Vec<Sample>>> {
        read_samples(self.session.fs(), self.sample_path())
    }

    fn sample_path(&self) -> &'static str {
        self.session
            .translator()
            .to_path(Field::Sample)
            .unwrap_or_else(|| unreachable!("module backends always have a sample file"))
    }

    pub fn detect(&mut self, duration: Duration) -> Result<RunResult> {
        let path = self.sample_path();
        self.samples = SampleStore::new();
        let outcome = self.session.run(duration, &mut self.samples, |fs, store| {
            while let Some(batch) = read_samples(fs, path)? {
                batch.into_iter().for_each(|sample| store.push(sample));
            }
            Ok(())
        })?;

        Ok(RunResult {
            backend: self.backend(),
            samples: self.samples.clone(),
            max_latency: self.get(Field::Max)?,
            exceeding_count: self.get(Field::Count)?,
            duration: outcome.elapsed,
            interrupted: outcome.interrupted,
            smi: outcome.smi,
        })
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    pub fn cleanup(&mut self) -> Result<()> {
        self.session.teardown(Some(&mut self.kmod))
    }

    /// Unload the module and unmount debugfs even if they were found in place.
    pub fn force_cleanup(&mut self) -> Result<()> {
        debug!("forcing unload of {}", self.kmod.name());
        self.kmod.take_ownership();
        debug!("forcing unmount of debugfs");
        self.session.fs_mut().take_ownership();
        self.cleanup()
    }
}

impl Drop for ModuleDetector {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("cleanup on drop failed: {e}");
        }
    }
}

fn read_samples(fs: &DebugFs, path: &str) -> Result<Option<Vec<Sample>>> {
    let Some(text) = fs.read_nonblocking(path)? else {
        return Ok(None);
    };
    let batch = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(Sample::parse_module)
        .collect::<Result<Vec<_>>>()?;
    Ok((!batch.is_empty()).then_some(batch))
}
