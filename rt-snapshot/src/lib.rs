//! # rt-snapshot
//!
//! Companion interface to running `cyclictest` instances. Each instance keeps
//! its state in a shared-memory file named `cyclictest<pid>` and rewrites it
//! when it receives `SIGUSR2`.
//!
//! - [`ShmDir::pids`]: which instances are alive
//! - [`request_snapshot`]: ask one instance to refresh its file
//! - [`ShmDir::read`]: the last snapshot an instance wrote

#![allow(unsafe_code)] // kill() requires unsafe

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

pub const DEFAULT_SHM_DIR: &str = "/dev/shm";
pub const DEFAULT_PREFIX: &str = "cyclictest";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("No running instance with pid {0}")]
    UnknownPid(u32),

    #[error("Failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Directory holding the per-instance shared-memory files.
#[derive(Debug, Clone)]
pub struct ShmDir {
    dir: PathBuf,
    prefix: String,
}

impl Default for ShmDir {
    fn default() -> Self {
        Self::new(DEFAULT_SHM_DIR, DEFAULT_PREFIX)
    }
}

impl ShmDir {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self { dir: dir.into(), prefix: prefix.into() }
    }

    pub fn path_for(&self, pid: u32) -> PathBuf {
        self.dir.join(format!("{}{pid}", self.prefix))
    }

    /// Pids of live instances, ascending. Files whose suffix is not a pid are ignored.
    pub fn pids(&self) -> Result<Vec<u32>> {
        let mut pids: Vec<u32> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| self.pid_of(&entry.path()))
            .collect();
        pids.sort_unstable();
        debug!("found {} instance(s) in {}", pids.len(), self.dir.display());
        Ok(pids)
    }

    fn pid_of(&self, path: &Path) -> Option<u32> {
        let name = path.file_name()?.to_str()?;
        let suffix = name.strip_prefix(&self.prefix)?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok()
    }

    /// Contents of the most recent snapshot written by `pid`.
    pub fn read(&self, pid: u32) -> Result<String> {
        match fs::read_to_string(self.path_for(pid)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SnapshotError::UnknownPid(pid)),
            other => Ok(other?),
        }
    }

    /// Restrict `requested` to live instances. An empty request selects all of them.
    pub fn select(&self, requested: &[u32]) -> Result<Vec<u32>> {
        let live = self.pids()?;
        if requested.is_empty() {
            return Ok(live);
        }
        Ok(requested.iter().copied().filter(|pid| live.contains(pid)).collect())
    }
}

/// Send `SIGUSR2` to `pid`, asking it to rewrite its shared-memory snapshot.
pub fn request_snapshot(pid: u32) -> Result<()> {
    let target = libc::pid_t::try_from(pid)
        .map_err(|_| SnapshotError::Signal { pid, source: io::Error::from(io::ErrorKind::InvalidInput) })?;
    debug!("kill -USR2 {pid}");
    if unsafe { libc::kill(target, libc::SIGUSR2) } != 0 {
        return Err(SnapshotError::Signal { pid, source: io::Error::last_os_error() });
    }
    Ok(())
}
