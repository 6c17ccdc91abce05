//! Normalization of raw factor samples onto [0,1].
//!
//! Three models are used:
//! - closeness to an ideal value (soil clay and pH, averaged),
//! - a ratio of matching elements to all elements (pervious land use),
//! - min-max rescaling over the sampled population (solar exposure, air quality).
//!
//! Every output is clamped and finite. Degenerate inputs (no elements, a population whose
//! values are all equal) map to defined values instead of failing.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

use crate::sample::{LandCoverSample, RawFactorSample, SoilSample};

/// Score given to every member of a population whose values are all equal.
pub const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdealValue {
    pub ideal: f64,
    pub tolerance: f64,
}

impl IdealValue {
    pub const fn new(ideal: f64, tolerance: f64) -> Self {
        Self { ideal, tolerance }
    }

    pub fn closeness(&self, measured: f64) -> f64 {
        if self.tolerance <= 0.0 {
            return if measured == self.ideal { 1.0 } else { 0.0 };
        }
        clamp_unit(1.0 - (self.ideal - measured).abs() / self.tolerance)
    }
}

fn default_clay() -> IdealValue {
    IdealValue::new(25.0, 25.0)
}

fn default_ph() -> IdealValue {
    IdealValue::new(6.8, 1.5)
}

fn default_pervious_land_uses() -> Vec<String> {
    ["forest", "meadow", "grass", "orchard", "vineyard"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_higher_is_better() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoilIdeals {
    #[serde(default = "default_clay")]
    pub clay_pct: IdealValue,
    #[serde(default = "default_ph")]
    pub ph: IdealValue,
}

impl Default for SoilIdeals {
    fn default() -> Self {
        Self {
            clay_pct: default_clay(),
            ph: default_ph(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerSettings {
    #[serde(default)]
    pub soil: SoilIdeals,
    #[serde(default = "default_pervious_land_uses")]
    pub pervious_land_uses: Vec<String>,
    /// Universal AQI grows with cleaner air; US-style AQI does the opposite.
    #[serde(default = "default_higher_is_better")]
    pub air_quality_higher_is_better: bool,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            soil: SoilIdeals::default(),
            pervious_land_uses: default_pervious_land_uses(),
            air_quality_higher_is_better: default_higher_is_better(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    settings: NormalizerSettings,
}

impl Normalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        Self { settings }
    }

    pub fn soil(&self, sample: &SoilSample) -> f64 {
        let ideals = &self.settings.soil;
        let scores: Vec<f64> = [
            sample.clay_pct.map(|clay| ideals.clay_pct.closeness(clay)),
            sample.ph.map(|ph| ideals.ph.closeness(ph)),
        ]
        .into_iter()
        .flatten()
        .collect();
        if scores.is_empty() {
            return 0.0;
        }
        clamp_unit(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    pub fn land_cover(&self, sample: &LandCoverSample) -> f64 {
        let pervious = sample
            .elements
            .iter()
            .filter(|el| {
                el.landuse
                    .as_deref()
                    .is_some_and(|tag| self.settings.pervious_land_uses.iter().any(|p| p == tag))
            })
            .count();
        ratio(pervious, sample.elements.len())
    }

    /// Normalize one factor's samples across the whole grid. `None` entries (failed
    /// fetches) stay `None` and take no part in population rescaling.
    pub fn normalize_column<S: Borrow<RawFactorSample>>(
        &self,
        samples: &[Option<S>],
    ) -> Vec<Option<f64>> {
        let prepared: Vec<Option<Prepared>> = samples
            .iter()
            .map(|sample| sample.as_ref().map(|s| self.prepare(s.borrow())))
            .collect();

        let population: Vec<Option<f64>> = prepared
            .iter()
            .map(|p| match p {
                Some(Prepared::Population(raw)) => Some(*raw),
                _ => None,
            })
            .collect();
        let rescaled = rescale_population(&population);

        prepared
            .into_iter()
            .zip(rescaled)
            .map(|(prepared, rescaled)| match prepared {
                Some(Prepared::Score(score)) => Some(score),
                Some(Prepared::Population(_)) => rescaled,
                None => None,
            })
            .collect()
    }

    fn prepare(&self, sample: &RawFactorSample) -> Prepared {
        match sample {
            RawFactorSample::LandCover(lc) => Prepared::Score(self.land_cover(lc)),
            RawFactorSample::Soil(soil) => Prepared::Score(self.soil(soil)),
            RawFactorSample::Buffer(buffer) => Prepared::Score(clamp_unit(buffer.clearance)),
            RawFactorSample::Score(score) => Prepared::Score(clamp_unit(*score)),
            RawFactorSample::Solar(solar) => Prepared::Population(solar.sunshine_hours_per_year),
            RawFactorSample::AirQuality(aq) => Prepared::Population(
                if self.settings.air_quality_higher_is_better {
                    aq.aqi
                } else {
                    -aq.aqi
                },
            ),
        }
    }
}

enum Prepared {
    Score(f64),
    Population(f64),
}

/// Clamp to [0,1]; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// `matching / total`, with an empty total scoring 0.
pub fn ratio(matching: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    clamp_unit(matching as f64 / total as f64)
}

/// Min-max rescale over the present, finite members of a population. Non-finite members
/// score 0; when every finite member is equal they all score [`NEUTRAL_SCORE`].
pub fn rescale_population(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let finite = values.iter().flatten().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    values
        .iter()
        .map(|value| {
            value.map(|v| {
                if !v.is_finite() {
                    0.0
                } else if min == max {
                    NEUTRAL_SCORE
                } else {
                    clamp_unit((v - min) / (max - min))
                }
            })
        })
        .collect()
}

/// [`rescale_population`] for a fully present population.
pub fn rescale(values: &[f64]) -> Vec<f64> {
    let wrapped: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    rescale_population(&wrapped)
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect()
}
