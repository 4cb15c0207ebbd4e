//! Latency samples and the result of one detection run.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::domain::{Backend, DetectorError, Result};
use crate::system::SmiDelta;

/// Whitespace-delimited field holding `inner/outer` in a tracer line
const TRACER_DURATION_FIELD: usize = 6;
/// Whitespace-delimited field holding `ts:<timestamp>` in a tracer line
const TRACER_TIMESTAMP_FIELD: usize = 7;
const TRACER_TIMESTAMP_PREFIX_LEN: usize = 3;

/// One `hwlat` tracer event.
///
/// Line format (from `trace_pipe`):
/// `<...>-1234 [002] d... 1234.5678: #1 inner/outer(us): 12/14 ts:1499801089.066141940 count:1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TracerSample {
    pub timestamp: String,
    pub inner: u64,
    pub outer: u64,
}

impl TracerSample {
    pub fn parse(line: &str) -> Result<Self> {
        let malformed = || DetectorError::Parse { what: "tracer sample", input: line.to_string() };
        let fields: Vec<&str> = line.split_whitespace().collect();

        let (inner, outer) = fields
            .get(TRACER_DURATION_FIELD)
            .and_then(|pair| pair.split_once('/'))
            .ok_or_else(malformed)?;
        let inner = inner.parse().map_err(|_| malformed())?;
        let outer = outer.parse().map_err(|_| malformed())?;

        let timestamp = fields
            .get(TRACER_TIMESTAMP_FIELD)
            .and_then(|ts| ts.get(TRACER_TIMESTAMP_PREFIX_LEN..))
            .filter(|ts| !ts.is_empty())
            .ok_or_else(malformed)?;

        Ok(Self { timestamp: timestamp.to_string(), inner, outer })
    }

    pub fn largest(&self) -> u64 {
        self.inner.max(self.outer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Sample {
    /// Raw latency in microseconds from a detector module
    Module(u64),
    Tracer(TracerSample),
}

impl Sample {
    /// Parse one module sample; surrounding whitespace is ignored.
    pub fn parse_module(text: &str) -> Result<Self> {
        let text = text.trim();
        text.parse()
            .map(Sample::Module)
            .map_err(|_| DetectorError::Parse { what: "module sample", input: text.to_string() })
    }

    /// Largest latency observed in this sample, in microseconds.
    pub fn largest(&self) -> u64 {
        match self {
            Sample::Module(value) => *value,
            Sample::Tracer(sample) => sample.largest(),
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sample::Module(value) => write!(f, "{value}"),
            Sample::Tracer(s) => {
                write!(f, "ts: {}, inner:{}, outer:{}", s.timestamp, s.inner, s.outer)
            }
        }
    }
}

/// Samples from one run, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SampleStore {
    samples: Vec<Sample>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn max_latency(&self) -> u64 {
        self.samples.iter().map(Sample::largest).max().unwrap_or(0)
    }

    pub fn count_above(&self, limit: u64) -> usize {
        self.samples.iter().filter(|s| s.largest() > limit).count()
    }

    /// One sample per line, newline-terminated.
    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for sample in &self.samples {
            writeln!(writer, "{sample}")?;
        }
        writer.flush()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))?;
        Ok(())
    }

    pub fn display(&self) {
        for sample in &self.samples {
            println!("{sample}");
        }
    }
}

/// Outcome of one `detect()` call. Owned by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub backend: Backend,
    pub samples: SampleStore,
    /// Microseconds
    pub max_latency: u64,
    /// Samples over the detector threshold, as counted by the backend
    pub exceeding_count: u64,
    #[serde(rename = "duration_secs", serialize_with = "seconds")]
    pub duration: Duration,
    pub interrupted: bool,
    pub smi: Option<SmiDelta>,
}

impl RunResult {
    /// Samples whose largest value exceeds `hardlimit` microseconds.
    pub fn violations(&self, hardlimit: u64) -> usize {
        self.samples.count_above(hardlimit)
    }
}

fn seconds<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
