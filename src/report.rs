//! JSON reports of finished analyses.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::factors::AnalysisParameters;
use crate::population::ScoredPopulation;
use crate::spatial::Region;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub scenario: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub region: Region,
    pub parameters: AnalysisParameters,
    pub population: ScoredPopulation,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes reports to `<output_dir>/<scenario>/analysis_<timestamp>.json`.
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn write(&self, report: &AnalysisReport) -> Result<PathBuf, ReportError> {
        let dir = self.output_dir.join(&report.scenario);
        fs::create_dir_all(&dir)?;
        let timestamp = report
            .population
            .metadata()
            .started_at
            .format("%Y-%m-%d_%H-%M-%S%.3f");
        let path = dir.join(format!("analysis_{timestamp}.json"));
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<AnalysisReport, ReportError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Report files for `scenario`, oldest first.
    pub fn list(&self, scenario: &str) -> Result<Vec<PathBuf>, ReportError> {
        let dir = self.output_dir.join(scenario);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut reports = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_report = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("analysis_") && name.ends_with(".json"));
            if path.is_file() && is_report {
                reports.push(path);
            }
        }
        reports.sort();
        Ok(reports)
    }
}
