//! # hwlat - Hardware Latency Detector Driver
//!
//! hwlat measures latency spikes caused by the hardware or firmware underneath
//! the kernel (System Management Interrupts, cache and NUMA stalls). It drives
//! the kernel's hardware latency detector through debugfs, polls it for
//! samples over a fixed test window, and reports samples that exceed a limit.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Kernel latency detector                     │
//! │  • hwlat tracer        (tracing/hwlat_detector, trace_pipe)     │
//! │  • hwlat_detector.ko   (hwlat_detector/*, microseconds)         │
//! │  • smi_detector.ko     (smi_detector/*, milliseconds)           │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ debugfs control files
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       hwlat (This Crate)                        │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   system     │──▶│   detector   │──▶│    export    │         │
//! │  │ debugfs/kmod │   │ fields/poll  │   │ (report.json)│         │
//! │  │ cstate/smi   │   │   samples    │   └──────────────┘         │
//! │  └──────────────┘   └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`system`]: host resources held for one session
//!   - `debugfs`: mount discovery, scoped mount, blocking/non-blocking control I/O
//!   - `kmod`: built-in / loaded / on-disk module classification and modprobe
//!   - `cstate`: zero-latency PM QoS request while measuring
//!   - `smi`: per-CPU SMI counters via `rdmsr`
//!   - `interrupt`: cooperative Ctrl+C handling
//!
//! - [`detector`]: the measurement engine
//!   - `fields`: abstract field → control file and unit translation
//!   - `module` / `tracer`: the two backend variants
//!   - `samples`: sample parsing, storage and the per-run result
//!
//! - [`export`]: JSON run report
//!
//! - [`cli`]: command-line arguments and unit parsing
//!
//! - [`config`]: paths, tools and tunables threaded through constructors
//!
//! - [`domain`]: fields, backends, ownership and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Two minute run with the detector's current settings
//! sudo ./hwlat
//!
//! # Ten minutes, 10us threshold, fail on anything above 50us
//! sudo ./hwlat --duration 10m --threshold 10us --hardlimit 50us --report samples.txt
//!
//! # Clean up after a crashed run
//! sudo ./hwlat --cleanup
//! ```

pub mod cli;
pub mod config;
pub mod detector;
pub mod domain;
pub mod export;
pub mod preflight;
pub mod system;
