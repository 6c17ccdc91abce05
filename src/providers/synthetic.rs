use async_trait::async_trait;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::{FactorProvider, ProviderError};
use crate::factors::FactorKey;
use crate::rng::RngManager;
use crate::sample::{
    AirQualitySample, BufferSample, LandCoverElement, LandCoverSample, RawFactorSample,
    SoilSample, SolarSample,
};
use crate::spatial::Coordinate;

const LAND_USES: [&str; 9] = [
    "forest",
    "meadow",
    "grass",
    "orchard",
    "farmland",
    "residential",
    "industrial",
    "commercial",
    "quarry",
];

/// Offline provider producing plausible native samples. Values depend only on the seed, the
/// factor and the coordinate, so repeated runs over the same grid agree.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticProvider {
    rng: RngManager,
}

impl SyntheticProvider {
    pub fn new(rng: RngManager) -> Self {
        Self { rng }
    }

    pub fn sample(&self, factor: FactorKey, at: Coordinate) -> RawFactorSample {
        let mut rng = self.rng.located(factor.as_str(), at);
        match factor {
            FactorKey::LandCover => land_cover(&mut rng).into(),
            FactorKey::Soil => SoilSample {
                clay_pct: Some(rng.gen_range(5.0..60.0)),
                ph: Some(rng.gen_range(4.5..8.5)),
            }
            .into(),
            FactorKey::Buffer => BufferSample {
                clearance: rng.gen_range(0.0..=1.0),
            }
            .into(),
            FactorKey::Solar => SolarSample {
                sunshine_hours_per_year: rng.gen_range(1_200.0..3_200.0),
            }
            .into(),
            FactorKey::AirQuality => AirQualitySample {
                aqi: rng.gen_range(20.0..100.0),
            }
            .into(),
        }
    }
}

fn land_cover(rng: &mut ChaCha8Rng) -> LandCoverSample {
    let count = rng.gen_range(0..12);
    let elements = (0..count)
        .map(|_| {
            // roughly one in eight elements carries no landuse tag
            if rng.gen_ratio(1, 8) {
                LandCoverElement::default()
            } else {
                LandCoverElement::tagged(LAND_USES[rng.gen_range(0..LAND_USES.len())])
            }
        })
        .collect();
    LandCoverSample { elements }
}

#[async_trait]
impl FactorProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch(
        &self,
        factor: FactorKey,
        at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        Ok(self.sample(factor, at))
    }
}
