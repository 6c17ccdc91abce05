//! Factor keys, weights, inclusion flags and per-cell factor scores.
//!
//! Weights and inclusion are two independent maps. Toggling a factor off never changes
//! what the remaining weights mean, and weights are never rescaled to sum to one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FactorKey {
    LandCover,
    Soil,
    Buffer,
    Solar,
    AirQuality,
}

impl FactorKey {
    pub const ALL: [FactorKey; 5] = [
        FactorKey::LandCover,
        FactorKey::Soil,
        FactorKey::Buffer,
        FactorKey::Solar,
        FactorKey::AirQuality,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FactorKey::LandCover => "landCover",
            FactorKey::Soil => "soil",
            FactorKey::Buffer => "buffer",
            FactorKey::Solar => "solar",
            FactorKey::AirQuality => "airQuality",
        }
    }
}

impl fmt::Display for FactorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_land_cover_weight() -> f64 {
    0.3
}

fn default_soil_weight() -> f64 {
    0.3
}

fn default_buffer_weight() -> f64 {
    0.2
}

fn default_solar_weight() -> f64 {
    0.1
}

fn default_air_quality_weight() -> f64 {
    0.1
}

fn default_included() -> bool {
    true
}

fn default_grid_size() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorWeights {
    #[serde(default = "default_land_cover_weight", alias = "land_cover")]
    pub land_cover: f64,
    #[serde(default = "default_soil_weight")]
    pub soil: f64,
    #[serde(default = "default_buffer_weight")]
    pub buffer: f64,
    #[serde(default = "default_solar_weight")]
    pub solar: f64,
    #[serde(default = "default_air_quality_weight", alias = "air_quality")]
    pub air_quality: f64,
}

impl FactorWeights {
    pub fn get(&self, factor: FactorKey) -> f64 {
        match factor {
            FactorKey::LandCover => self.land_cover,
            FactorKey::Soil => self.soil,
            FactorKey::Buffer => self.buffer,
            FactorKey::Solar => self.solar,
            FactorKey::AirQuality => self.air_quality,
        }
    }

    pub fn set(&mut self, factor: FactorKey, weight: f64) {
        match factor {
            FactorKey::LandCover => self.land_cover = weight,
            FactorKey::Soil => self.soil = weight,
            FactorKey::Buffer => self.buffer = weight,
            FactorKey::Solar => self.solar = weight,
            FactorKey::AirQuality => self.air_quality = weight,
        }
    }

    pub fn with(mut self, factor: FactorKey, weight: f64) -> Self {
        self.set(factor, weight);
        self
    }

    pub fn total(&self) -> f64 {
        FactorKey::ALL.iter().map(|f| self.get(*f)).sum()
    }
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            land_cover: default_land_cover_weight(),
            soil: default_soil_weight(),
            buffer: default_buffer_weight(),
            solar: default_solar_weight(),
            air_quality: default_air_quality_weight(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeFactors {
    #[serde(default = "default_included", alias = "land_cover")]
    pub land_cover: bool,
    #[serde(default = "default_included")]
    pub soil: bool,
    #[serde(default = "default_included")]
    pub buffer: bool,
    #[serde(default = "default_included")]
    pub solar: bool,
    #[serde(default = "default_included", alias = "air_quality")]
    pub air_quality: bool,
}

impl IncludeFactors {
    pub fn all() -> Self {
        Self {
            land_cover: true,
            soil: true,
            buffer: true,
            solar: true,
            air_quality: true,
        }
    }

    pub fn none() -> Self {
        Self {
            land_cover: false,
            soil: false,
            buffer: false,
            solar: false,
            air_quality: false,
        }
    }

    pub fn is_included(&self, factor: FactorKey) -> bool {
        match factor {
            FactorKey::LandCover => self.land_cover,
            FactorKey::Soil => self.soil,
            FactorKey::Buffer => self.buffer,
            FactorKey::Solar => self.solar,
            FactorKey::AirQuality => self.air_quality,
        }
    }

    pub fn set(&mut self, factor: FactorKey, included: bool) {
        match factor {
            FactorKey::LandCover => self.land_cover = included,
            FactorKey::Soil => self.soil = included,
            FactorKey::Buffer => self.buffer = included,
            FactorKey::Solar => self.solar = included,
            FactorKey::AirQuality => self.air_quality = included,
        }
    }

    pub fn with(mut self, factor: FactorKey, included: bool) -> Self {
        self.set(factor, included);
        self
    }

    /// Included factors in [`FactorKey::ALL`] order.
    pub fn included(&self) -> Vec<FactorKey> {
        FactorKey::ALL
            .into_iter()
            .filter(|f| self.is_included(*f))
            .collect()
    }
}

impl Default for IncludeFactors {
    fn default() -> Self {
        Self::all()
    }
}

/// Normalized per-factor scores for one cell. Values are expected to lie in [0,1].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorScores(BTreeMap<FactorKey, f64>);

impl FactorScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uniform(value: f64) -> Self {
        FactorKey::ALL.into_iter().map(|f| (f, value)).collect()
    }

    pub fn get(&self, factor: FactorKey) -> Option<f64> {
        self.0.get(&factor).copied()
    }

    pub fn insert(&mut self, factor: FactorKey, score: f64) {
        self.0.insert(factor, score);
    }

    pub fn with(mut self, factor: FactorKey, score: f64) -> Self {
        self.insert(factor, score);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (FactorKey, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(FactorKey, f64)> for FactorScores {
    fn from_iter<T: IntoIterator<Item = (FactorKey, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Caller-owned parameters for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisParameters {
    #[serde(default = "default_grid_size", alias = "grid_size")]
    pub grid_size: f64,
    #[serde(default)]
    pub weights: FactorWeights,
    #[serde(default, alias = "include_factors")]
    pub include_factors: IncludeFactors,
}

impl AnalysisParameters {
    pub fn new(grid_size: f64) -> Self {
        Self {
            grid_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.grid_size.is_finite() || self.grid_size <= 0.0 {
            return Err(AnalysisError::invalid_region(format!(
                "grid size must be a positive number, got {}",
                self.grid_size
            )));
        }
        for factor in FactorKey::ALL {
            let weight = self.weights.get(factor);
            if !weight.is_finite() || weight < 0.0 {
                return Err(AnalysisError::invalid_parameters(format!(
                    "weight for {factor} must be a non-negative number, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for AnalysisParameters {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            weights: FactorWeights::default(),
            include_factors: IncludeFactors::default(),
        }
    }
}
