//! # hwlat - Main Entry Point
//!
//! Configures the detector from the command line, runs one measurement, prints
//! or saves the samples, and exits with the number of samples above the hard
//! limit (capped at 125, below the codes shells reserve).

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, warn, LevelFilter};

use hwlat::cli::Args;
use hwlat::config::{BackendChoice, Config};
use hwlat::detector::{Detector, RunResult};
use hwlat::domain::{DetectorError, Field};
use hwlat::export::{JsonReport, RunParameters};
use hwlat::preflight::run_preflight_checks;
use hwlat::system::Interrupt;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;
const EXIT_INTERRUPTED: i32 = 130;
const EXIT_MAX_VIOLATIONS: usize = 125;

fn main() {
    let args = Args::parse();
    init_logging(&args);
    std::process::exit(match run(&args) {
        Ok(code) => code,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

/// `RUST_LOG` still overrides the level chosen by --debug / --quiet
fn init_logging(args: &Args) {
    let level = if args.debug {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let denied = err.chain().any(|cause| {
        cause.downcast_ref::<DetectorError>().is_some_and(DetectorError::is_permission_denied)
            || cause
                .downcast_ref::<std::io::Error>()
                .is_some_and(|e| e.kind() == std::io::ErrorKind::PermissionDenied)
    });
    if denied {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

fn config_from(args: &Args) -> Config {
    Config {
        backend: if args.kmodule { BackendChoice::Module } else { BackendChoice::Auto },
        confirm_retries: args.retries,
        suppress_cstates: !args.keep_cstates,
        watch: args.watch,
        ..Config::default()
    }
}

/// Apply threshold, window and width in that order, keeping width < window.
fn configure(detector: &mut Detector, args: &Args) -> Result<()> {
    if let Some(threshold) = args.threshold {
        detector.set(Field::Threshold, threshold)?;
        debug!("threshold set to {threshold}us");
    }
    if let Some(window) = args.window {
        detector.set_window(window)?;
        debug!("window for sampling set to {window}us");
    }
    if let Some(width) = args.width {
        detector.set_width(width)?;
        debug!("sample width set to {width}us");
    }
    Ok(())
}

fn print_summary(result: &RunResult, hardlimit: u64) {
    println!("test finished");
    println!("   Max Latency: {}us", result.max_latency);
    println!("   Samples recorded: {}", result.samples.len());
    println!("   Samples exceeding threshold: {}", result.exceeding_count);
    println!("   Samples exceeding hard limit ({hardlimit}us): {}", result.violations(hardlimit));
    if let Some(smi) = &result.smi {
        for (cpu, count) in &smi.per_cpu {
            println!("   {count} SMIs occurred on {cpu}");
        }
        println!("   SMIs during run: {}", smi.total);
    }
}

fn run(args: &Args) -> Result<i32> {
    let quiet = args.quiet;
    let config = config_from(args);

    // Run pre-flight checks before anything else
    run_preflight_checks(&config, quiet)?;

    let interrupt = Interrupt::new();
    interrupt.install().context("Error setting Ctrl-C handler")?;

    let mut detector =
        Detector::open(config, interrupt).context("Failed to set up the hardware latency detector")?;

    if args.cleanup {
        debug!("forcing cleanup of debugfs and hardware latency module");
        detector.force_cleanup()?;
        return Ok(EXIT_SUCCESS);
    }

    configure(&mut detector, args)?;

    let threshold = detector.get(Field::Threshold)?;
    let window = detector.get(Field::Window)?;
    let width = detector.get(Field::Width)?;
    let hardlimit = args.hardlimit.unwrap_or(threshold);

    if !quiet {
        println!("hwlat v{}", env!("CARGO_PKG_VERSION"));
        println!("   test duration: {}s", args.duration.as_secs());
        println!("   detector: {}", detector.backend());
        println!("   parameters:");
        println!("        Latency threshold:    {threshold}us");
        println!("        Sample window:        {window}us");
        println!("        Sample width:         {width}us");
        println!("        Non-sampling period:  {}us", window.saturating_sub(width));
        println!("        Hard limit:           {hardlimit}us");
        if let Some(ref report) = args.report {
            println!("        Output File:          {}", report.display());
        }
        println!("\nstarting test");
    }

    let result = match detector.detect(args.duration) {
        Ok(result) => result,
        Err(e) => {
            if let (Some(report), false) = (&args.report, detector.samples().is_empty()) {
                match detector.save(report) {
                    Ok(()) => warn!("partial sample data written to {}", report.display()),
                    Err(save) => warn!("could not write partial samples: {save}"),
                }
            }
            return Err(anyhow::Error::new(e).context("Hardware latency detection failed"));
        }
    };

    if !quiet {
        if result.interrupted {
            println!("interrupted");
        }
        print_summary(&result, hardlimit);
    }

    if let Some(ref report) = args.report {
        detector.save(report).with_context(|| format!("Failed to write {}", report.display()))?;
        if !quiet {
            println!("sample data written to {}", report.display());
        }
    } else if !quiet && !args.watch {
        detector.display();
    }

    if let Some(ref path) = args.json {
        let params = RunParameters { threshold, hardlimit, window, width };
        JsonReport::new(params, &result).save(path).context("Failed to export run report")?;
        if !quiet {
            println!("saved: {}", path.display());
        }
    }

    detector.cleanup()?;

    let violations = result.violations(hardlimit);
    Ok(match violations {
        0 if result.interrupted => EXIT_INTERRUPTED,
        n => i32::try_from(n.min(EXIT_MAX_VIOLATIONS)).unwrap_or(EXIT_ERROR),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_exit_code_for_missing_root() {
        let err = anyhow::Error::new(DetectorError::NotRoot).context("Failed to set up the hardware latency detector");
        assert_eq!(exit_code_for(&err), EXIT_NOPERM);
    }

    #[test]
    fn test_exit_code_for_kernel_permission_error() {
        let io = io::Error::from(io::ErrorKind::PermissionDenied);
        let err = anyhow::Error::new(DetectorError::Io(io)).context("Hardware latency detection failed");
        assert_eq!(exit_code_for(&err), EXIT_NOPERM);

        let err = anyhow::Error::new(io::Error::from(io::ErrorKind::PermissionDenied)).context("Failed to write report");
        assert_eq!(exit_code_for(&err), EXIT_NOPERM);
    }

    #[test]
    fn test_exit_code_ignores_message_text() {
        let err = anyhow::anyhow!("permission denied by a user-supplied path name");
        assert_eq!(exit_code_for(&err), EXIT_ERROR);
        let err = anyhow::Error::new(DetectorError::MountFailed("/sys/kernel/debug".into()));
        assert_eq!(exit_code_for(&err), EXIT_ERROR);
    }
}
