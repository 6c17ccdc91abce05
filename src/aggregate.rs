//! Weighted aggregation of factor scores and suitability bands.
//!
//! The aggregate is a plain weighted sum over included factors. Weights are not rescaled
//! and the result is not clamped; the band thresholds below assume the caller chose
//! weights whose weighted sum stays within [0,1].

use serde::{Deserialize, Serialize};

use crate::factors::{FactorKey, FactorScores, FactorWeights, IncludeFactors};

pub const HIGH_SUITABILITY_THRESHOLD: f64 = 0.7;
pub const MODERATE_SUITABILITY_THRESHOLD: f64 = 0.4;

/// Result of aggregating one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub score: f64,
    /// Included factors that had no score and contributed zero.
    pub missing: Vec<FactorKey>,
}

impl Aggregate {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SuitabilityAggregator;

impl SuitabilityAggregator {
    pub fn aggregate(
        &self,
        scores: &FactorScores,
        weights: &FactorWeights,
        included: &IncludeFactors,
    ) -> Aggregate {
        let mut score = 0.0;
        let mut missing = Vec::new();
        for factor in included.included() {
            match scores.get(factor) {
                Some(value) => score += value * weights.get(factor),
                None => missing.push(factor),
            }
        }
        Aggregate { score, missing }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuitabilityBand {
    High,
    Moderate,
    Low,
}

impl SuitabilityBand {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_SUITABILITY_THRESHOLD {
            SuitabilityBand::High
        } else if score >= MODERATE_SUITABILITY_THRESHOLD {
            SuitabilityBand::Moderate
        } else {
            SuitabilityBand::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SuitabilityBand::High => "Highly suitable",
            SuitabilityBand::Moderate => "Moderately suitable",
            SuitabilityBand::Low => "Low suitability",
        }
    }
}

/// Counts of a scored population by band.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationSummary {
    pub sites_analyzed: usize,
    pub highly_suitable: usize,
    pub moderately_suitable: usize,
    pub low_suitability: usize,
    pub mean_score: f64,
    pub max_score: f64,
}

impl PopulationSummary {
    pub fn from_scores(scores: impl IntoIterator<Item = f64>) -> Self {
        let mut summary = PopulationSummary::default();
        let mut total = 0.0;
        let mut max = f64::NEG_INFINITY;
        for score in scores {
            summary.sites_analyzed += 1;
            total += score;
            max = max.max(score);
            match SuitabilityBand::from_score(score) {
                SuitabilityBand::High => summary.highly_suitable += 1,
                SuitabilityBand::Moderate => summary.moderately_suitable += 1,
                SuitabilityBand::Low => summary.low_suitability += 1,
            }
        }
        if summary.sites_analyzed > 0 {
            summary.mean_score = total / summary.sites_analyzed as f64;
            summary.max_score = max;
        }
        summary
    }
}
