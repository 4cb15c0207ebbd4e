//! Runtime configuration threaded through every component constructor.
//!
//! `Config::default()` describes a stock Linux host. Tests re-point the paths
//! at a scratch directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Poll interval for the sampling loop and the enable/disable confirmation loops
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Filesystem locations the detector reads from or writes to.
#[derive(Debug, Clone)]
pub struct SystemPaths {
    /// Live mount table, scanned for an existing debugfs mount
    pub proc_mounts: PathBuf,
    /// Where to mount debugfs when it is not mounted yet
    pub debugfs_mountpoint: PathBuf,
    /// Currently loaded modules
    pub proc_modules: PathBuf,
    /// Module tree for the running kernel; `None` resolves `/lib/modules/<release>`
    pub modules_dir: Option<PathBuf>,
    /// PM QoS latency request device
    pub cpu_dma_latency: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            proc_mounts: PathBuf::from("/proc/mounts"),
            debugfs_mountpoint: PathBuf::from("/sys/kernel/debug"),
            proc_modules: PathBuf::from("/proc/modules"),
            modules_dir: None,
            cpu_dma_latency: PathBuf::from("/dev/cpu_dma_latency"),
        }
    }
}

/// External programs invoked for privileged operations.
#[derive(Debug, Clone)]
pub struct Tools {
    pub mount: PathBuf,
    pub umount: PathBuf,
    pub modprobe: PathBuf,
    pub rdmsr: PathBuf,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            mount: PathBuf::from("/bin/mount"),
            umount: PathBuf::from("/bin/umount"),
            modprobe: PathBuf::from("/sbin/modprobe"),
            rdmsr: PathBuf::from("/usr/sbin/rdmsr"),
        }
    }
}

/// Which backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendChoice {
    /// Probe tracer, then `hwlat_detector`, then `smi_detector`
    #[default]
    Auto,
    Tracer,
    /// Module backends only (`hwlat_detector`, falling back to `smi_detector`)
    Module,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub paths: SystemPaths,
    pub tools: Tools,
    pub backend: BackendChoice,
    pub poll_interval: Duration,
    /// Bound on enable/disable confirmation attempts; `None` retries until interrupted
    pub confirm_retries: Option<u32>,
    pub require_root: bool,
    /// Hold a zero-latency PM QoS request while the detector runs
    pub suppress_cstates: bool,
    /// Print each sample as it is collected
    pub watch: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: SystemPaths::default(),
            tools: Tools::default(),
            backend: BackendChoice::Auto,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirm_retries: None,
            require_root: true,
            suppress_cstates: true,
            watch: false,
        }
    }
}

impl Config {
    /// Configuration rooted at a scratch directory: no privilege check, every
    /// system path under `root`, and tools that do not exist.
    pub fn sandboxed(root: &Path) -> Self {
        Self {
            paths: SystemPaths {
                proc_mounts: root.join("proc/mounts"),
                debugfs_mountpoint: root.join("debug"),
                proc_modules: root.join("proc/modules"),
                modules_dir: Some(root.join("lib/modules")),
                cpu_dma_latency: root.join("dev/cpu_dma_latency"),
            },
            tools: Tools {
                mount: root.join("bin/mount"),
                umount: root.join("bin/umount"),
                modprobe: root.join("sbin/modprobe"),
                rdmsr: root.join("sbin/rdmsr"),
            },
            require_root: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_host_layout() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.confirm_retries, None);
        assert!(config.require_root);
        assert_eq!(config.paths.debugfs_mountpoint, Path::new("/sys/kernel/debug"));
    }

    #[test]
    fn test_sandboxed_paths_stay_under_root() {
        let root = Path::new("/tmp/sandbox");
        let config = Config::sandboxed(root);
        assert!(!config.require_root);
        assert!(config.paths.proc_mounts.starts_with(root));
        assert!(config.paths.cpu_dma_latency.starts_with(root));
        assert!(config.tools.rdmsr.starts_with(root));
    }
}
