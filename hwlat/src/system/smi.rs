//! Per-CPU System Management Interrupt counters.
//!
//! Read through `rdmsr` (msr-tools) from `MSR_SMI_COUNT`. When the tool is
//! missing the feature is simply off.

use std::path::PathBuf;
use std::process::Command;

use log::debug;
use serde::Serialize;

use crate::config::Config;
use crate::domain::{CpuId, DetectorError, Result};

/// `MSR_SMI_COUNT` on Intel processors
const MSR_SMI_COUNT: &str = "0x34";

#[derive(Debug, Clone)]
pub struct SmiCounter {
    rdmsr: PathBuf,
}

/// SMIs attributed to each CPU over one run. Only CPUs whose count grew appear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SmiDelta {
    pub per_cpu: Vec<(CpuId, u64)>,
    pub total: u64,
}

impl SmiCounter {
    pub fn probe(config: &Config) -> Option<Self> {
        let rdmsr = config.tools.rdmsr.clone();
        if rdmsr.exists() {
            Some(Self { rdmsr })
        } else {
            debug!("{} not found, SMI counting disabled", rdmsr.display());
            None
        }
    }

    /// One count per CPU, in CPU order.
    pub fn snapshot(&self) -> Result<Vec<u64>> {
        let output = Command::new(&self.rdmsr).args(["-a", "-d", MSR_SMI_COUNT]).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(DetectorError::Parse { what: "rdmsr output", input: stdout.into_owned() });
        }
        parse_counts(&stdout)
    }
}

pub fn parse_counts(output: &str) -> Result<Vec<u64>> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse()
                .map_err(|_| DetectorError::Parse { what: "SMI count", input: line.to_string() })
        })
        .collect()
}

impl SmiDelta {
    #[allow(clippy::cast_possible_truncation)]
    pub fn between(before: &[u64], after: &[u64]) -> Self {
        let per_cpu: Vec<(CpuId, u64)> = before
            .iter()
            .zip(after)
            .enumerate()
            .filter(|(_, (pre, post))| post > pre)
            .map(|(cpu, (pre, post))| (CpuId(cpu as u32), post - pre))
            .collect();
        let total = per_cpu.iter().map(|(_, n)| n).sum();
        Self { per_cpu, total }
    }
}
