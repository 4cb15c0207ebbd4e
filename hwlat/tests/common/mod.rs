//! Fake kernel for integration tests: a debugfs tree in a temp directory,
//! already "mounted" according to a fake mount table, with FIFOs standing in
//! for the non-blocking sample channels.

#![allow(dead_code, unsafe_code)]

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use hwlat::config::Config;
use tempfile::TempDir;

pub struct FakeKernel {
    pub root: TempDir,
    pub config: Config,
    /// Write end of the sample FIFO; kept open so empty reads report EAGAIN
    pipe: File,
}

fn mkfifo(path: &Path) {
    let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    assert_eq!(rc, 0, "mkfifo {}", path.display());
}

impl FakeKernel {
    fn base(loaded_modules: &str, files: &[(&str, &str)], sample_fifo: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = Config::sandboxed(root.path());
        config.poll_interval = Duration::from_millis(10);

        let debug = config.paths.debugfs_mountpoint.clone();
        fs::create_dir_all(root.path().join("proc")).unwrap();
        fs::create_dir_all(root.path().join("dev")).unwrap();
        fs::create_dir_all(config.paths.modules_dir.as_ref().unwrap()).unwrap();
        fs::create_dir_all(&debug).unwrap();

        fs::write(
            &config.paths.proc_mounts,
            format!("proc /proc proc rw 0 0\nnone {} debugfs rw 0 0\n", debug.display()),
        )
        .unwrap();
        fs::write(&config.paths.proc_modules, loaded_modules).unwrap();
        fs::write(&config.paths.cpu_dma_latency, b"").unwrap();

        for (rel, content) in files {
            let path = debug.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let fifo = debug.join(sample_fifo);
        fs::create_dir_all(fifo.parent().unwrap()).unwrap();
        mkfifo(&fifo);
        let pipe = OpenOptions::new().read(true).write(true).open(&fifo).unwrap();

        Self { root, config, pipe }
    }

    pub fn tracer() -> Self {
        Self::base(
            "",
            &[
                ("tracing/hwlat_detector/width", "500000\n"),
                ("tracing/hwlat_detector/window", "1000000\n"),
                ("tracing/tracing_thresh", "10\n"),
                ("tracing/tracing_on", "1\n"),
                ("tracing/current_tracer", "nop\n"),
            ],
            "tracing/trace_pipe",
        )
    }

    pub fn hwlat_module() -> Self {
        Self::base(
            "hwlat_detector 16384 0 - Live 0x0000000000000000\n",
            &[
                ("hwlat_detector/threshold", "10\n"),
                ("hwlat_detector/window", "1000000\n"),
                ("hwlat_detector/width", "500000\n"),
                ("hwlat_detector/enable", "0\n"),
                ("hwlat_detector/count", "0\n"),
                ("hwlat_detector/max", "0\n"),
            ],
            "hwlat_detector/sample",
        )
    }

    pub fn smi_module() -> Self {
        Self::base(
            "smi_detector 16384 0 - Live 0x0000000000000000\n",
            &[
                ("smi_detector/latency_threshold_us", "100\n"),
                ("smi_detector/ms_per_sample", "600\n"),
                ("smi_detector/ms_between_samples", "400\n"),
                ("smi_detector/enable", "0\n"),
                ("smi_detector/smi_count", "0\n"),
                ("smi_detector/max_sample_us", "0\n"),
            ],
            "smi_detector/sample_us",
        )
    }

    /// Push text into the sample channel as the kernel would.
    pub fn feed(&mut self, text: &str) {
        self.pipe.write_all(text.as_bytes()).unwrap();
    }

    /// Independent handle on the sample channel for feeding from another thread.
    pub fn feeder(&self) -> File {
        self.pipe.try_clone().unwrap()
    }

    /// Replace `<dir>/enable` with a FIFO answered by `reply`.
    ///
    /// Every value the detector writes is handed to `reply`, and the returned
    /// value is what the detector reads back next. Module backends always
    /// follow an enable write with a read, so the two sides stay in lock step.
    /// Do not `read` the enable file from the test itself afterwards.
    pub fn script_enable(&self, dir: &str, mut reply: impl FnMut(u64) -> u64 + Send + 'static) {
        let path = self.debug_path(&format!("{dir}/enable"));
        fs::remove_file(&path).unwrap();
        mkfifo(&path);
        thread::spawn(move || loop {
            let Ok(written) = fs::read_to_string(&path) else { return };
            let Ok(value) = written.trim().parse() else { return };
            if fs::write(&path, format!("{}\n", reply(value))).is_err() {
                return;
            }
        });
    }

    pub fn debug_path(&self, rel: &str) -> PathBuf {
        self.config.paths.debugfs_mountpoint.join(rel)
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.debug_path(rel)).unwrap().trim().to_string()
    }

    pub fn write(&self, rel: &str, value: &str) {
        fs::write(self.debug_path(rel), value).unwrap();
    }
}

pub fn trace_line(seq: u32, inner: u64, outer: u64) -> String {
    format!(
        "<...>-1234  [002] d... 1234.{seq:06}: #{seq}     inner/outer(us): {inner:>4}/{outer:<4} ts:1499801089.{seq:09} count:1\n"
    )
}
