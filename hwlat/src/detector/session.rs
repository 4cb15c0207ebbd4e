//! Backend-independent detector state machine.
//!
//! ```text
//! Constructed ──configured()──▶ Configured
//!
//! Configured ──start()──▶ Running ──stop()──▶ Stopped ──┐
//!     ▲                                                 │ (next run)
//!     └─────────────────────────────────────────────────┘
//! any ──teardown()──▶ Cleaned
//! ```
//!
//! The enable/disable confirmation loops and the sampling loop sleep one poll
//! interval per iteration and check the interrupt flag at every boundary.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::fields::{Access, FieldTranslator};
use super::samples::{Sample, SampleStore};
use crate::config::Config;
use crate::domain::{Backend, DetectorError, Field, Result, State};
use crate::system::{CStateGuard, DebugFs, Interrupt, ModuleLoader, SmiCounter, SmiDelta};

/// Raw output of one sampling run, before backend-specific summary values.
/// Samples go straight into the caller's store.
#[derive(Debug)]
pub(crate) struct RunOutcome {
    pub elapsed: Duration,
    pub interrupted: bool,
    pub smi: Option<SmiDelta>,
}

#[derive(Debug)]
pub(crate) struct Session {
    fs: DebugFs,
    translator: FieldTranslator,
    config: Config,
    interrupt: Interrupt,
    cstate: Option<CStateGuard>,
    smi: Option<SmiCounter>,
    state: State,
}

impl Session {
    pub fn new(fs: DebugFs, backend: Backend, config: Config, interrupt: Interrupt) -> Self {
        let smi = SmiCounter::probe(&config);
        Self {
            fs,
            translator: FieldTranslator::for_backend(backend),
            config,
            interrupt,
            cstate: None,
            smi,
            state: State::Constructed,
        }
    }

    /// Backend setup finished; the detector may now be started.
    pub fn configured(&mut self) {
        if self.state == State::Constructed {
            self.state = State::Configured;
        }
    }

    pub fn fs(&self) -> &DebugFs {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut DebugFs {
        &mut self.fs
    }

    pub fn translator(&self) -> FieldTranslator {
        self.translator
    }

    pub fn state(&self) -> State {
        self.state
    }

    fn path(&self, field: Field) -> &'static str {
        match self.translator.to_path(field) {
            Some(path) => path,
            None => unreachable!("{field} has no control file on the {} backend", self.translator.backend()),
        }
    }

    fn read_raw(&self, field: Field) -> Result<u64> {
        let text = self.fs.read(self.path(field))?;
        let text = text.trim();
        text.parse().map_err(|_| DetectorError::Parse { what: field.name(), input: text.to_string() })
    }

    fn write_raw(&self, field: Field, raw: u64) -> Result<()> {
        self.fs.write(self.path(field), raw)
    }

    /// Read a file-backed field in microseconds (or as a plain count).
    pub fn get(&self, field: Field) -> Result<u64> {
        let raw = self.read_raw(field)?;
        match self.translator.spec(field).access {
            Access::SyntheticWindow => Ok(self.translator.window_from_parts(self.get(Field::Width)?, raw)),
            _ => Ok(self.translator.from_backend_units(field, raw)),
        }
    }

    /// Write a field given in microseconds (or as a plain count).
    pub fn set(&self, field: Field, value: u64) -> Result<()> {
        let value = if field == Field::Enable { u64::from(value != 0) } else { value };
        match self.translator.spec(field).access {
            Access::ReadWrite => {
                self.translator.check_granularity(field, value)?;
                self.write_raw(field, self.translator.to_backend_units(field, value))
            }
            Access::SyntheticWindow => {
                let interval = self.translator.interval_for_window(value, self.get(Field::Width)?)?;
                self.write_raw(field, interval)
            }
            Access::ReadOnly | Access::Computed => {
                Err(DetectorError::ReadOnlyField { field, backend: self.translator.backend() })
            }
        }
    }

    /// Write `enable` until it reads back `value`.
    ///
    /// Gives up on an interrupt newer than `generation`, or after
    /// `confirm_retries` attempts when that bound is configured.
    fn confirm_enable(&self, value: u64, generation: u64) -> Result<()> {
        self.write_raw(Field::Enable, value)?;
        let mut attempts = 1;
        while self.read_raw(Field::Enable)? != value {
            if self.interrupt.fired_since(generation) {
                return Err(DetectorError::Interrupted(Field::Enable));
            }
            if self.config.confirm_retries.is_some_and(|limit| attempts >= limit) {
                return Err(DetectorError::ConfirmationTimeout { field: Field::Enable, value, attempts });
            }
            debug!("retrying setting enable to {value} ({attempts})");
            thread::sleep(self.config.poll_interval);
            self.write_raw(Field::Enable, value)?;
            attempts += 1;
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state, State::Configured | State::Stopped) {
            return Err(DetectorError::InvalidState { op: "start", state: self.state });
        }
        let threshold = self.get(Field::Threshold)?;

        if self.config.suppress_cstates {
            match CStateGuard::acquire(&self.config.paths.cpu_dma_latency) {
                Ok(guard) => self.cstate = Some(guard),
                Err(e) => warn!("C-states stay enabled, measurements may include idle exit latency: {e}"),
            }
        }

        debug!("enabling {} detector (threshold: {threshold}us)", self.translator.backend());
        self.state = State::Running;
        // Any interrupt, including one delivered before the run, aborts enabling
        self.confirm_enable(1, 0)?;

        if self.get(Field::Threshold)? != threshold {
            debug!("threshold reset by enable, restoring {threshold}us");
            self.set(Field::Threshold, threshold)?;
        }
        info!("{} detector enabled", self.translator.backend());
        Ok(())
    }

    /// Disable and confirm; C-states are restored only once disabling is confirmed.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != State::Running {
            return Ok(());
        }
        debug!("disabling {} detector", self.translator.backend());
        self.confirm_enable(0, self.interrupt.generation())?;
        self.state = State::Stopped;
        if let Some(guard) = self.cstate.take() {
            guard.release();
        }
        Ok(())
    }

    /// Enable, poll `drain` into `samples` every interval until `duration`
    /// elapses or an interrupt arrives, then disable.
    ///
    /// `drain` must empty everything currently readable before returning.
    /// Samples collected before an error stay in `samples`.
    pub fn run<F>(&mut self, duration: Duration, samples: &mut SampleStore, mut drain: F) -> Result<RunOutcome>
    where
        F: FnMut(&DebugFs, &mut SampleStore) -> Result<()>,
    {
        let smi_before = self.smi_snapshot();
        let started = Instant::now();

        debug!("starting hardware latency detection for {}s", duration.as_secs_f64());
        let polled = self.start().and_then(|()| self.poll(started + duration, &mut drain, samples));
        let stopped = self.stop();
        let elapsed = started.elapsed();

        let interrupted = polled?;
        stopped?;
        if interrupted {
            info!("interrupted after {:.1}s", elapsed.as_secs_f64());
        }
        debug!("hardware latency detection done ({} samples)", samples.len());

        let smi = smi_before.zip(self.smi_snapshot()).map(|(pre, post)| SmiDelta::between(&pre, &post));
        Ok(RunOutcome { elapsed, interrupted, smi })
    }

    /// Drain-then-sleep until the deadline. Returns whether an interrupt ended the loop.
    fn poll<F>(&self, deadline: Instant, drain: &mut F, samples: &mut SampleStore) -> Result<bool>
    where
        F: FnMut(&DebugFs, &mut SampleStore) -> Result<()>,
    {
        let mut polls = 0u64;
        loop {
            polls += 1;
            let seen = samples.len();
            drain(&self.fs, samples)?;
            self.announce(samples.iter().skip(seen));

            if self.interrupt.is_set() {
                debug!("stopping after interrupt (poll count: {polls})");
                return Ok(true);
            }
            if Instant::now() >= deadline {
                debug!("stopping at deadline (poll count: {polls})");
                return Ok(false);
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    fn announce<'a>(&self, new: impl Iterator<Item = &'a Sample>) {
        for sample in new {
            debug!("got a latency sample: {sample}");
            if self.config.watch {
                println!("{sample}");
            }
        }
    }

    fn smi_snapshot(&self) -> Option<Vec<u64>> {
        let counter = self.smi.as_ref()?;
        counter.snapshot().map_err(|e| warn!("SMI counters unavailable: {e}")).ok()
    }

    /// Disable if running, then unload the module and unmount debugfs when
    /// they are ours. Both teardown steps are attempted even if one fails.
    /// Repeated calls are no-ops.
    pub fn teardown(&mut self, kmod: Option<&mut ModuleLoader>) -> Result<()> {
        if self.state == State::Cleaned {
            return Ok(());
        }
        if let Err(e) = self.stop() {
            warn!("detector may still be enabled: {e}");
        }
        self.cstate = None;

        let unload = kmod.map(ModuleLoader::unload).and_then(Result::err);
        let unmount = self.fs.unmount().err();
        self.state = State::Cleaned;

        if unload.is_none() && unmount.is_none() {
            return Ok(());
        }
        Err(DetectorError::Teardown {
            unload: unload.map(|e| e.to_string()),
            unmount: unmount.map(|e| e.to_string()),
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.teardown(None) {
            warn!("cleanup on drop failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn session(backend: Backend) -> (tempfile::TempDir, Session) {
        let root = tempfile::tempdir().unwrap();
        let config = Config::sandboxed(root.path());
        fs::create_dir_all(root.path().join("proc")).unwrap();
        fs::create_dir_all(config.paths.debugfs_mountpoint.join("smi_detector")).unwrap();
        fs::write(
            &config.paths.proc_mounts,
            format!("none {} debugfs rw 0 0\n", config.paths.debugfs_mountpoint.display()),
        )
        .unwrap();
        let debugfs = DebugFs::mount(&config).unwrap();
        (root, Session::new(debugfs, backend, config, Interrupt::new()))
    }

    #[test]
    fn test_start_requires_configured() {
        let (_root, mut session) = session(Backend::SmiModule);
        assert_eq!(session.state(), State::Constructed);
        assert!(matches!(
            session.start(),
            Err(DetectorError::InvalidState { op: "start", state: State::Constructed })
        ));

        session.configured();
        assert_eq!(session.state(), State::Configured);
        session.teardown(None).unwrap();
        assert_eq!(session.state(), State::Cleaned);

        // Cleaned is terminal
        session.configured();
        assert_eq!(session.state(), State::Cleaned);
    }

    #[test]
    fn test_set_rejects_sub_millisecond_width() {
        let (root, session) = session(Backend::SmiModule);
        let width = root.path().join("debug/smi_detector/ms_per_sample");
        fs::write(&width, "600\n").unwrap();

        assert!(matches!(
            session.set(Field::Width, 600_500),
            Err(DetectorError::Granularity { field: Field::Width, value: 600_500, step: 1000 })
        ));
        assert_eq!(fs::read_to_string(&width).unwrap(), "600\n");

        session.set(Field::Width, 700_000).unwrap();
        assert_eq!(session.get(Field::Width).unwrap(), 700_000);
    }
}
