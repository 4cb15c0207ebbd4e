//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use super::units::{parse_micros, parse_seconds};

#[derive(Parser)]
#[command(
    name = "hwlat",
    version,
    about = "Detect hardware and firmware induced latency (SMIs, stalls) with the kernel hwlat detector",
    after_help = "\
EXAMPLES:
    sudo hwlat --duration 2m                          Two minute run with current detector settings
    sudo hwlat --threshold 10us --hardlimit 50us      Fail only on spikes above 50us
    sudo hwlat --window 1s --width 500ms --report out.txt

TIME UNITS:
    durations: <n>[s|m|h|d|w]     latencies: <n>[us|ms|s] (default us)"
)]
pub struct Args {
    /// Total time to test for hardware latency
    #[arg(long, value_parser = parse_seconds, default_value = "120")]
    pub duration: Duration,

    /// Value above which a latency is recorded by the detector
    #[arg(long, value_parser = parse_micros)]
    pub threshold: Option<u64>,

    /// Value above which the run is considered a failure (defaults to threshold)
    #[arg(long, value_parser = parse_micros)]
    pub hardlimit: Option<u64>,

    /// Sampling period
    #[arg(long, value_parser = parse_micros)]
    pub window: Option<u64>,

    /// Time actually measured within each window
    #[arg(long, value_parser = parse_micros)]
    pub width: Option<u64>,

    /// Write samples to FILE, one per line, instead of printing them
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Write a JSON run report to FILE
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Use a detector kernel module instead of the hwlat tracer
    #[arg(long)]
    pub kmodule: bool,

    /// Print samples as they are collected
    #[arg(long)]
    pub watch: bool,

    /// Leave C-states enabled during the run
    #[arg(long)]
    pub keep_cstates: bool,

    /// Give up if the detector does not confirm enable/disable after N attempts
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Force unload of the module and unmount of debugfs, then exit
    #[arg(long)]
    pub cleanup: bool,

    /// Turn on debugging output
    #[arg(long, conflicts_with = "quiet")]
    pub debug: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}
