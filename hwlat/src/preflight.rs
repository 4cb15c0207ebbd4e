//! Pre-flight checks for hwlat
//!
//! Validates system requirements before touching debugfs or kernel modules.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::domain::DetectorError;

/// Run all pre-flight checks before opening a detector
pub fn run_preflight_checks(config: &Config, quiet: bool) -> Result<()> {
    if config.require_root {
        check_privileges()?;
    }
    check_debugfs_support(Path::new("/proc/filesystems"))?;
    check_optional_tools(config, quiet);
    Ok(())
}

pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Mounting debugfs, loading modules and holding a PM QoS request all need root
fn check_privileges() -> Result<()> {
    if is_root() {
        return Ok(());
    }
    Err(DetectorError::NotRoot.into())
}

/// Check that the running kernel knows about debugfs
fn check_debugfs_support(filesystems: &Path) -> Result<()> {
    let listing = std::fs::read_to_string(filesystems)
        .with_context(|| format!("Failed to read {}", filesystems.display()))?;

    // Lines look like "nodev\tdebugfs" or "\text4"
    let supported = listing.lines().any(|line| line.split_whitespace().last() == Some("debugfs"));
    if !supported {
        bail!(
            "debugfs is not supported by this kernel.\n\n\
             hwlat needs CONFIG_DEBUG_FS to reach the hardware latency detector."
        );
    }
    Ok(())
}

/// Warn about missing tools that only disable optional features
fn check_optional_tools(config: &Config, quiet: bool) {
    if quiet {
        return;
    }
    if !config.tools.rdmsr.exists() {
        eprintln!("warning: {} not found, SMI counts will not be reported", config.tools.rdmsr.display());
    }
    if config.suppress_cstates && !config.paths.cpu_dma_latency.exists() {
        eprintln!(
            "warning: {} not found, C-states stay enabled during the run",
            config.paths.cpu_dma_latency.display()
        );
    }
}
