//! CPU idle-state suppression via a PM QoS latency request.
//!
//! Writing a zero latency to `/dev/cpu_dma_latency` keeps every CPU out of
//! deep C-states for as long as the file descriptor stays open.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use log::debug;

use crate::domain::Result;

#[derive(Debug)]
pub struct CStateGuard {
    handle: File,
}

impl CStateGuard {
    pub fn acquire(path: &Path) -> Result<Self> {
        let mut handle = OpenOptions::new().write(true).open(path)?;
        // The kernel accepts a raw native-endian s32
        handle.write_all(&0i32.to_ne_bytes())?;
        debug!("C-states disabled via {}", path.display());
        Ok(Self { handle })
    }

    /// Close the handle, dropping the latency request.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for CStateGuard {
    fn drop(&mut self) {
        // Closing `handle` withdraws the request
        debug!("C-states re-enabled");
        let _ = self.handle.flush();
    }
}
