use async_trait::async_trait;

use super::{FactorProvider, ProviderError};
use crate::factors::FactorKey;
use crate::sample::RawFactorSample;
use crate::spatial::Coordinate;

/// Returns the same sample for every location.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedProvider {
    sample: RawFactorSample,
}

impl FixedProvider {
    pub fn new(sample: impl Into<RawFactorSample>) -> Self {
        Self {
            sample: sample.into(),
        }
    }

    /// A pre-normalized score, valid for any factor.
    pub fn score(score: f64) -> Self {
        Self {
            sample: RawFactorSample::Score(score),
        }
    }
}

#[async_trait]
impl FactorProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch(
        &self,
        _factor: FactorKey,
        _at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        Ok(self.sample.clone())
    }
}
