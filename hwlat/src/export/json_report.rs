use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::detector::RunResult;
use crate::domain::ExportError;

/// Detector settings in effect for the run, in microseconds
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunParameters {
    pub threshold: u64,
    pub hardlimit: u64,
    pub window: u64,
    pub width: u64,
}

/// JSON document: parameters, violation count and the full run result
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub parameters: RunParameters,
    /// Samples above the hard limit
    pub violations: usize,
    pub result: &'a RunResult,
}

impl<'a> JsonReport<'a> {
    pub fn new(parameters: RunParameters, result: &'a RunResult) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            parameters,
            violations: result.violations(parameters.hardlimit),
            result,
        }
    }

    pub fn export<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ExportError> {
        let file = File::create(path)
            .map_err(|e| ExportError::WriteFailed(format!("{}: {e}", path.display())))?;
        self.export(BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Sample, SampleStore, TracerSample};
    use crate::domain::{Backend, CpuId};
    use crate::system::SmiDelta;
    use std::time::Duration;

    fn result() -> RunResult {
        let mut samples = SampleStore::new();
        samples.push(Sample::Tracer(TracerSample { timestamp: "100.5".into(), inner: 12, outer: 40 }));
        samples.push(Sample::Tracer(TracerSample { timestamp: "101.5".into(), inner: 9, outer: 3 }));
        RunResult {
            backend: Backend::Tracer,
            max_latency: samples.max_latency(),
            exceeding_count: samples.len() as u64,
            samples,
            duration: Duration::from_millis(2500),
            interrupted: false,
            smi: Some(SmiDelta { per_cpu: vec![(CpuId(1), 2)], total: 2 }),
        }
    }

    #[test]
    fn test_export_creates_valid_json() {
        let result = result();
        let params = RunParameters { threshold: 10, hardlimit: 20, window: 1_000_000, width: 500_000 };
        let mut buffer = Vec::new();
        JsonReport::new(params, &result).export(&mut buffer).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buffer).expect("Invalid JSON");
        assert_eq!(parsed["violations"], 1);
        assert_eq!(parsed["parameters"]["hardlimit"], 20);
        assert_eq!(parsed["result"]["backend"], "tracer");
        assert_eq!(parsed["result"]["max_latency"], 40);
        assert_eq!(parsed["result"]["duration_secs"], 2.5);
        assert_eq!(parsed["result"]["samples"][0]["outer"], 40);
        assert_eq!(parsed["result"]["smi"]["total"], 2);
    }

    #[test]
    fn test_save_to_unwritable_path() {
        let result = result();
        let params = RunParameters { threshold: 10, hardlimit: 10, window: 0, width: 0 };
        let err = JsonReport::new(params, &result)
            .save(Path::new("/nonexistent/dir/report.json"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/dir/report.json"));
    }
}
