//! Request and print snapshots from running cyclictest instances.
//!
//! With no arguments, every live instance is asked for a snapshot and all
//! snapshots are printed.

use anyhow::{Context, Result};
use clap::Parser;
use log::{warn, LevelFilter};

use rt_snapshot::{request_snapshot, ShmDir, DEFAULT_PREFIX, DEFAULT_SHM_DIR};

#[derive(Parser)]
#[command(name = "rt-snapshot", version, about = "Get a snapshot of running instances of cyclictest")]
struct Args {
    /// List the main pid(s) of running instances
    #[arg(short, long)]
    list: bool,

    /// Take a snapshot of the given instances (all if no pid is given)
    #[arg(short, long, value_name = "PID", num_args = 0..)]
    snapshot: Option<Vec<u32>>,

    /// Print the snapshots of the given instances (all if no pid is given)
    #[arg(short, long, value_name = "PID", num_args = 0..)]
    print: Option<Vec<u32>>,

    /// Directory holding the shared-memory files
    #[arg(long, default_value = DEFAULT_SHM_DIR, hide = true)]
    shm_dir: String,

    /// Turn on debugging output
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn nothing_requested(&self) -> bool {
        !self.list && self.snapshot.is_none() && self.print.is_none()
    }
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    let level = if args.debug { LevelFilter::Debug } else { LevelFilter::Warn };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    if args.nothing_requested() {
        args.snapshot = Some(Vec::new());
        args.print = Some(Vec::new());
    }

    let shm = ShmDir::new(&args.shm_dir, DEFAULT_PREFIX);
    let pids = shm.pids().with_context(|| format!("Failed to scan {}", args.shm_dir))?;

    if args.list {
        for pid in &pids {
            println!("{pid}");
        }
    }

    if let Some(requested) = &args.snapshot {
        for pid in shm.select(requested)? {
            if let Err(e) = request_snapshot(pid) {
                warn!("{e}");
            }
        }
    }

    if let Some(requested) = &args.print {
        for pid in shm.select(requested)? {
            let data = shm.read(pid).with_context(|| format!("Failed to read snapshot of {pid}"))?;
            println!("{data}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_requests_everything() {
        let args = Args::try_parse_from(["rt-snapshot"]).unwrap();
        assert!(args.nothing_requested());
    }

    #[test]
    fn test_flags_without_pids() {
        let args = Args::try_parse_from(["rt-snapshot", "-s", "-p"]).unwrap();
        assert_eq!(args.snapshot, Some(vec![]));
        assert_eq!(args.print, Some(vec![]));
        assert!(!args.nothing_requested());
    }

    #[test]
    fn test_pid_lists() {
        let args = Args::try_parse_from(["rt-snapshot", "--snapshot", "10", "20", "--list"]).unwrap();
        assert_eq!(args.snapshot, Some(vec![10, 20]));
        assert!(args.list);
        assert_eq!(args.print, None);
    }
}
