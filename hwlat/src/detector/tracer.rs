//! Detector backed by the `hwlat` ftrace tracer.
//!
//! Samples are drained from `tracing/trace_pipe`. A read may end mid-line, so
//! the unterminated tail is carried over to the next read. `count` and `max`
//! are computed from the collected samples.

use std::time::Duration;

use log::{debug, warn};

use super::samples::{RunResult, Sample, SampleStore, TracerSample};
use super::session::Session;
use crate::domain::{Backend, DetectorError, Field, Result, State};
use crate::system::DebugFs;

pub(crate) const TRACER_DIR: &str = "tracing/hwlat_detector";
const CURRENT_TRACER: &str = "tracing/current_tracer";
const TRACE_PIPE: &str = "tracing/trace_pipe";

/// Splits a byte stream into complete lines.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    fn feed(&mut self, chunk: &str, mut on_line: impl FnMut(&str) -> Result<()>) -> Result<()> {
        self.pending.push_str(chunk);
        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            let line = line.trim();
            if !line.is_empty() {
                on_line(line)?;
            }
        }
        Ok(())
    }

    fn take_rest(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

#[derive(Debug)]
pub struct TracerDetector {
    session: Session,
    lines: LineBuffer,
    samples: SampleStore,
}

impl TracerDetector {
    /// Disable tracing and select the `hwlat` tracer.
    pub(crate) fn open(session: Session) -> Result<Self> {
        if !session.fs().exists(TRACER_DIR) {
            return Err(DetectorError::unavailable(Backend::Tracer.name(), "hwlat tracer not available"));
        }
        let mut detector = Self { session, lines: LineBuffer::default(), samples: SampleStore::new() };
        detector.set(Field::Enable, 0)?;
        detector.session.fs().write(CURRENT_TRACER, "hwlat")?;
        detector.session.configured();
        debug!("using hwlat tracer");
        Ok(detector)
    }

    pub fn backend(&self) -> Backend {
        Backend::Tracer
    }

    pub fn state(&self) -> State {
        self.session.state()
    }

    pub fn get(&self, field: Field) -> Result<u64> {
        match field {
            Field::Count => Ok(self.samples.len() as u64),
            Field::Max => Ok(self.samples.max_latency()),
            _ => self.session.get(field),
        }
    }

    pub fn set(&mut self, field: Field, value: u64) -> Result<()> {
        self.session.set(field, value)
    }

    pub fn detect(&mut self, duration: Duration) -> Result<RunResult> {
        let lines = &mut self.lines;
        self.samples = SampleStore::new();
        let outcome = self.session.run(duration, &mut self.samples, |fs, store| drain_pipe(fs, lines, store));
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                // Keep what was parsed; a half line from an aborted run is dropped
                self.lines = LineBuffer::default();
                return Err(e);
            }
        };
        if let Some(rest) = self.lines.take_rest() {
            self.samples.push(Sample::Tracer(TracerSample::parse(&rest)?));
        }

        Ok(RunResult {
            backend: Backend::Tracer,
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

    /// Disable tracing, restore the `nop` tracer, and release debugfs.
    pub fn cleanup(&mut self) -> Result<()> {
        if self.state() != State::Cleaned {
            if let Err(e) = self.session.stop() {
                warn!("tracer may still be enabled: {e}");
            }
            let restored = self
                .set(Field::Enable, 0)
                .and_then(|()| self.session.fs().write(CURRENT_TRACER, "nop"));
            if let Err(e) = restored {
                warn!("failed to restore nop tracer: {e}");
            }
        }
        self.session.teardown(None)
    }

    pub fn force_cleanup(&mut self) -> Result<()> {
        debug!("forcing unmount of debugfs");
        self.session.fs_mut().take_ownership();
        self.cleanup()
    }
}

impl Drop for TracerDetector {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("cleanup on drop failed: {e}");
        }
    }
}

fn drain_pipe(fs: &DebugFs, lines: &mut LineBuffer, store: &mut SampleStore) -> Result<()> {
    while let Some(chunk) = fs.read_nonblocking(TRACE_PIPE)? {
        lines.feed(&chunk, |line| {
            store.push(Sample::Tracer(TracerSample::parse(line)?));
            Ok(())
        })?;
    }
    Ok(())
}
