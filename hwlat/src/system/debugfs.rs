//! Scoped access to the debug control filesystem.
//!
//! If debugfs is already mounted somewhere, that mount is reused and left in
//! place at teardown. Only a mount performed here is unmounted.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::config::Config;
use crate::domain::{DetectorError, Ownership, Result};

/// Upper bound on one non-blocking read of a control file
const READ_CHUNK: usize = 4096;

/// Find the mountpoint of an existing debugfs mount in a mount table.
///
/// Format: "device mountpoint fstype options dump pass"
pub fn find_debugfs_mount(mounts: &str) -> Option<PathBuf> {
    mounts.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let mountpoint = fields.nth(1)?;
        (fields.next()? == "debugfs").then(|| PathBuf::from(mountpoint))
    })
}

#[derive(Debug)]
pub struct DebugFs {
    mountpoint: PathBuf,
    ownership: Ownership,
    mounted: bool,
    umount_tool: PathBuf,
}

impl DebugFs {
    /// Make debugfs available, mounting it at the preferred path only when
    /// the live mount table shows no existing mount.
    pub fn mount(config: &Config) -> Result<Self> {
        let umount_tool = config.tools.umount.clone();
        let mounts = fs::read_to_string(&config.paths.proc_mounts)?;

        if let Some(mountpoint) = find_debugfs_mount(&mounts) {
            debug!("debugfs already mounted at {}, not mounting", mountpoint.display());
            return Ok(Self { mountpoint, ownership: Ownership::NotOwned, mounted: true, umount_tool });
        }

        let mountpoint = config.paths.debugfs_mountpoint.clone();
        debug!("mounting debugfs at {}", mountpoint.display());
        let status = Command::new(&config.tools.mount)
            .args(["-t", "debugfs", "none"])
            .arg(&mountpoint)
            .status();
        match status {
            Ok(status) if status.success() => {
                Ok(Self { mountpoint, ownership: Ownership::OwnedByUs, mounted: true, umount_tool })
            }
            _ => Err(DetectorError::MountFailed(mountpoint)),
        }
    }

    /// Unmount if, and only if, the mount is ours. Repeated calls are no-ops.
    pub fn unmount(&mut self) -> Result<()> {
        if !self.ownership.is_owned() || !self.mounted {
            debug!("not unmounting debugfs");
            return Ok(());
        }
        debug!("unmounting debugfs at {}", self.mountpoint.display());
        let status = Command::new(&self.umount_tool).arg(&self.mountpoint).status();
        match status {
            Ok(status) if status.success() => {
                self.mounted = false;
                Ok(())
            }
            _ => Err(DetectorError::UnmountFailed(self.mountpoint.clone())),
        }
    }

    /// Treat the mount as ours regardless of how it was found.
    pub fn take_ownership(&mut self) {
        self.ownership = Ownership::OwnedByUs;
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn path(&self, item: &str) -> PathBuf {
        self.mountpoint.join(item)
    }

    pub fn exists(&self, item: &str) -> bool {
        self.path(item).exists()
    }

    /// Blocking read of a control file.
    pub fn read(&self, item: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path(item))?)
    }

    /// Non-blocking read. `Ok(None)` means nothing is ready yet.
    pub fn read_nonblocking(&self, item: &str) -> Result<Option<String>> {
        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(self.path(item))?;

        let mut buf = vec![0u8; READ_CHUNK];
        match file.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(String::from_utf8_lossy(&buf[..n]).into_owned())),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Single buffered write-and-flush of a scalar value.
    pub fn write(&self, item: &str, value: impl std::fmt::Display) -> Result<()> {
        let mut file = open_for_write(&self.path(item))?;
        file.write_all(value.to_string().as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

fn open_for_write(path: &Path) -> io::Result<File> {
    // Control files exist or the backend is missing; never create them.
    OpenOptions::new().write(true).truncate(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
debugfs /sys/kernel/debug debugfs rw,nosuid,nodev,noexec,relatime 0 0
tracefs /sys/kernel/tracing tracefs rw,nosuid,nodev,noexec,relatime 0 0
";

    #[test]
    fn test_find_debugfs_mount() {
        assert_eq!(find_debugfs_mount(MOUNTS), Some(PathBuf::from("/sys/kernel/debug")));
    }

    #[test]
    fn test_find_debugfs_mount_absent() {
        let mounts = "proc /proc proc rw 0 0\ntracefs /sys/kernel/tracing tracefs rw 0 0\n";
        assert_eq!(find_debugfs_mount(mounts), None);
        assert_eq!(find_debugfs_mount(""), None);
    }

    fn premounted() -> (tempfile::TempDir, DebugFs) {
        let root = tempfile::tempdir().unwrap();
        let config = Config::sandboxed(root.path());
        fs::create_dir_all(root.path().join("proc")).unwrap();
        fs::create_dir_all(&config.paths.debugfs_mountpoint).unwrap();
        fs::write(
            &config.paths.proc_mounts,
            format!("none {} debugfs rw 0 0\n", config.paths.debugfs_mountpoint.display()),
        )
        .unwrap();
        let fs = DebugFs::mount(&config).unwrap();
        (root, fs)
    }

    #[test]
    fn test_existing_mount_is_not_owned() {
        let (_root, mut fs) = premounted();
        assert_eq!(fs.ownership(), Ownership::NotOwned);
        // umount tool does not exist, so this only succeeds as a no-op
        fs.unmount().unwrap();
        fs.unmount().unwrap();
    }

    #[test]
    fn test_mount_failure_is_setup_error() {
        let root = tempfile::tempdir().unwrap();
        let config = Config::sandboxed(root.path());
        fs::create_dir_all(root.path().join("proc")).unwrap();
        fs::write(&config.paths.proc_mounts, "proc /proc proc rw 0 0\n").unwrap();

        let err = DebugFs::mount(&config).unwrap_err();
        assert!(err.is_setup());
    }

    #[test]
    fn test_write_then_read() {
        let (_root, fs) = premounted();
        std::fs::write(fs.path("threshold"), "10\n").unwrap();
        fs.write("threshold", 25).unwrap();
        assert_eq!(fs.read("threshold").unwrap(), "25");
    }

    #[test]
    fn test_write_never_creates_files() {
        let (_root, fs) = premounted();
        assert!(fs.write("missing", 1).is_err());
        assert!(!fs.exists("missing"));
    }

    #[test]
    fn test_nonblocking_read_of_empty_file_is_none() {
        let (_root, fs) = premounted();
        std::fs::write(fs.path("sample"), "").unwrap();
        assert_eq!(fs.read_nonblocking("sample").unwrap(), None);
    }

    #[test]
    fn test_nonblocking_read_of_missing_file_is_error() {
        let (_root, fs) = premounted();
        assert!(fs.read_nonblocking("sample").is_err());
    }
}
