//! Raw, provider-native factor measurements.
//!
//! Only [`crate::normalize::Normalizer`] interprets these shapes.

use serde::{Deserialize, Serialize};

use crate::factors::FactorKey;

/// One land-use element around a location (an OSM way or relation).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LandCoverElement {
    pub landuse: Option<String>,
}

impl LandCoverElement {
    pub fn tagged(landuse: impl Into<String>) -> Self {
        Self {
            landuse: Some(landuse.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LandCoverSample {
    pub elements: Vec<LandCoverElement>,
}

/// Topsoil properties. Either value may be missing from the source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SoilSample {
    pub clay_pct: Option<f64>,
    pub ph: Option<f64>,
}

/// Distance-to-conflict measure in [0,1]; 1 means well clear of any conflict zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferSample {
    pub clearance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarSample {
    pub sunshine_hours_per_year: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirQualitySample {
    pub aqi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawFactorSample {
    LandCover(LandCoverSample),
    Soil(SoilSample),
    Buffer(BufferSample),
    Solar(SolarSample),
    AirQuality(AirQualitySample),
    /// A score the provider already mapped onto [0,1]; it is only clamped.
    Score(f64),
}

impl RawFactorSample {
    /// Factor this shape belongs to; `None` for pre-normalized scores, which fit any factor.
    pub fn factor(&self) -> Option<FactorKey> {
        match self {
            RawFactorSample::LandCover(_) => Some(FactorKey::LandCover),
            RawFactorSample::Soil(_) => Some(FactorKey::Soil),
            RawFactorSample::Buffer(_) => Some(FactorKey::Buffer),
            RawFactorSample::Solar(_) => Some(FactorKey::Solar),
            RawFactorSample::AirQuality(_) => Some(FactorKey::AirQuality),
            RawFactorSample::Score(_) => None,
        }
    }

    pub fn fits(&self, factor: FactorKey) -> bool {
        self.factor().map_or(true, |own| own == factor)
    }
}

impl From<LandCoverSample> for RawFactorSample {
    fn from(value: LandCoverSample) -> Self {
        RawFactorSample::LandCover(value)
    }
}

impl From<SoilSample> for RawFactorSample {
    fn from(value: SoilSample) -> Self {
        RawFactorSample::Soil(value)
    }
}

impl From<BufferSample> for RawFactorSample {
    fn from(value: BufferSample) -> Self {
        RawFactorSample::Buffer(value)
    }
}

impl From<SolarSample> for RawFactorSample {
    fn from(value: SolarSample) -> Self {
        RawFactorSample::Solar(value)
    }
}

impl From<AirQualitySample> for RawFactorSample {
    fn from(value: AirQualitySample) -> Self {
        RawFactorSample::AirQuality(value)
    }
}
