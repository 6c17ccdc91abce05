//! Scored cells and the population a run produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{PopulationSummary, SuitabilityBand};
use crate::factors::{FactorKey, FactorScores};
use crate::spatial::Coordinate;

/// Why a factor on a cell used the fallback score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Degradation {
    pub factor: FactorKey,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCell {
    pub id: String,
    pub coordinates: Coordinate,
    pub suitability_score: f64,
    pub factors: FactorScores,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradation: Vec<Degradation>,
    pub synthetic: bool,
}

impl ScoredCell {
    pub fn cell_id(index: usize) -> String {
        format!("cell-{index}")
    }

    pub fn band(&self) -> SuitabilityBand {
        SuitabilityBand::from_score(self.suitability_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunOutcome {
    /// Every fetch succeeded.
    Complete,
    /// Some cells used fallback scores.
    Degraded,
    /// Every fetch failed; the population is synthetic.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RunOutcome,
    pub synthetic: bool,
    pub degraded_cells: usize,
    pub fetches_attempted: usize,
    pub fetches_failed: usize,
}

/// Cells in grid order with their summary. Built once per run and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredPopulation {
    cells: Vec<ScoredCell>,
    summary: PopulationSummary,
    metadata: RunMetadata,
}

impl ScoredPopulation {
    pub(crate) fn new(cells: Vec<ScoredCell>, metadata: RunMetadata) -> Self {
        let summary = PopulationSummary::from_scores(cells.iter().map(|c| c.suitability_score));
        Self {
            cells,
            summary,
            metadata,
        }
    }

    pub fn cells(&self) -> &[ScoredCell] {
        &self.cells
    }

    pub fn summary(&self) -> &PopulationSummary {
        &self.summary
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn outcome(&self) -> RunOutcome {
        self.metadata.outcome
    }

    pub fn is_synthetic(&self) -> bool {
        self.metadata.synthetic
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata.outcome == RunOutcome::Degraded
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells at or above `band`, best first.
    pub fn ranked(&self, band: SuitabilityBand) -> Vec<&ScoredCell> {
        let floor = match band {
            SuitabilityBand::High => crate::aggregate::HIGH_SUITABILITY_THRESHOLD,
            SuitabilityBand::Moderate => crate::aggregate::MODERATE_SUITABILITY_THRESHOLD,
            SuitabilityBand::Low => f64::NEG_INFINITY,
        };
        let mut ranked: Vec<&ScoredCell> = self
            .cells
            .iter()
            .filter(|c| c.suitability_score >= floor)
            .collect();
        ranked.sort_by(|a, b| b.suitability_score.total_cmp(&a.suitability_score));
        ranked
    }
}
