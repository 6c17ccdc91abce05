//! Factor provider port.
//!
//! A [`FactorProvider`] returns one raw measurement for one factor at one location and may
//! fail independently of every other request. Factor-specific providers
//! ([`LandCoverProvider`], [`SoilProvider`], ...) return their native sample shape and are
//! adapted to the generic port when registered in a [`ProviderSet`].
//!
//! # Example
//!
//! ```ignore
//! let providers = ProviderSet::new()
//!     .with_buffer(ConflictZoneBuffer::new(zones, 25.0))
//!     .with(FactorKey::Soil, SyntheticProvider::new(RngManager::new(7)));
//! ```

mod buffer;
mod fixed;
pub mod http;
mod synthetic;

pub use buffer::{ConflictZone, ConflictZoneBuffer};
pub use fixed::FixedProvider;
pub use synthetic::SyntheticProvider;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::factors::FactorKey;
use crate::sample::{
    AirQualitySample, BufferSample, LandCoverSample, RawFactorSample, SoilSample, SolarSample,
};
use crate::spatial::Coordinate;

/// Why a provider could not deliver a sample. Both variants mean "no sample for this factor
/// on this cell"; neither aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        ProviderError::Unavailable(msg.into())
    }
}

#[async_trait]
pub trait FactorProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(
        &self,
        factor: FactorKey,
        at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError>;
}

#[async_trait]
pub trait LandCoverProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn land_cover(&self, at: Coordinate) -> Result<LandCoverSample, ProviderError>;
}

#[async_trait]
pub trait SoilProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn soil(&self, at: Coordinate) -> Result<SoilSample, ProviderError>;
}

#[async_trait]
pub trait BufferProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn buffer(&self, at: Coordinate) -> Result<BufferSample, ProviderError>;
}

#[async_trait]
pub trait SolarProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn solar(&self, at: Coordinate) -> Result<SolarSample, ProviderError>;
}

#[async_trait]
pub trait AirQualityProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn air_quality(&self, at: Coordinate) -> Result<AirQualitySample, ProviderError>;
}

fn wrong_factor(provider: &str, serves: FactorKey, asked: FactorKey) -> ProviderError {
    ProviderError::unavailable(format!("{provider} serves {serves}, not {asked}"))
}

/// Adapts a [`LandCoverProvider`] to the generic port.
pub struct LandCoverSource<P>(pub P);

#[async_trait]
impl<P: LandCoverProvider> FactorProvider for LandCoverSource<P> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn fetch(
        &self,
        factor: FactorKey,
        at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        if factor != FactorKey::LandCover {
            return Err(wrong_factor(self.0.name(), FactorKey::LandCover, factor));
        }
        Ok(self.0.land_cover(at).await?.into())
    }
}

/// Adapts a [`SoilProvider`] to the generic port.
pub struct SoilSource<P>(pub P);

#[async_trait]
impl<P: SoilProvider> FactorProvider for SoilSource<P> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn fetch(
        &self,
        factor: FactorKey,
        at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        if factor != FactorKey::Soil {
            return Err(wrong_factor(self.0.name(), FactorKey::Soil, factor));
        }
        Ok(self.0.soil(at).await?.into())
    }
}

/// Adapts a [`BufferProvider`] to the generic port.
pub struct BufferSource<P>(pub P);

#[async_trait]
impl<P: BufferProvider> FactorProvider for BufferSource<P> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn fetch(
        &self,
        factor: FactorKey,
        at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        if factor != FactorKey::Buffer {
            return Err(wrong_factor(self.0.name(), FactorKey::Buffer, factor));
        }
        Ok(self.0.buffer(at).await?.into())
    }
}

/// Adapts a [`SolarProvider`] to the generic port.
pub struct SolarSource<P>(pub P);

#[async_trait]
impl<P: SolarProvider> FactorProvider for SolarSource<P> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn fetch(
        &self,
        factor: FactorKey,
        at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        if factor != FactorKey::Solar {
            return Err(wrong_factor(self.0.name(), FactorKey::Solar, factor));
        }
        Ok(self.0.solar(at).await?.into())
    }
}

/// Adapts an [`AirQualityProvider`] to the generic port.
pub struct AirQualitySource<P>(pub P);

#[async_trait]
impl<P: AirQualityProvider> FactorProvider for AirQualitySource<P> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn fetch(
        &self,
        factor: FactorKey,
        at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        if factor != FactorKey::AirQuality {
            return Err(wrong_factor(self.0.name(), FactorKey::AirQuality, factor));
        }
        Ok(self.0.air_quality(at).await?.into())
    }
}

/// The provider registered for each factor. Cloning shares the providers.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<FactorKey, Arc<dyn FactorProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One provider answering for every factor.
    pub fn for_all(provider: impl FactorProvider + 'static) -> Self {
        let shared: Arc<dyn FactorProvider> = Arc::new(provider);
        let mut set = Self::new();
        for factor in FactorKey::ALL {
            set.insert(factor, Arc::clone(&shared));
        }
        set
    }

    pub fn insert(&mut self, factor: FactorKey, provider: Arc<dyn FactorProvider>) {
        self.providers.insert(factor, provider);
    }

    pub fn with(mut self, factor: FactorKey, provider: impl FactorProvider + 'static) -> Self {
        self.insert(factor, Arc::new(provider));
        self
    }

    pub fn with_land_cover(self, provider: impl LandCoverProvider + 'static) -> Self {
        self.with(FactorKey::LandCover, LandCoverSource(provider))
    }

    pub fn with_soil(self, provider: impl SoilProvider + 'static) -> Self {
        self.with(FactorKey::Soil, SoilSource(provider))
    }

    pub fn with_buffer(self, provider: impl BufferProvider + 'static) -> Self {
        self.with(FactorKey::Buffer, BufferSource(provider))
    }

    pub fn with_solar(self, provider: impl SolarProvider + 'static) -> Self {
        self.with(FactorKey::Solar, SolarSource(provider))
    }

    pub fn with_air_quality(self, provider: impl AirQualityProvider + 'static) -> Self {
        self.with(FactorKey::AirQuality, AirQualitySource(provider))
    }

    pub fn get(&self, factor: FactorKey) -> Option<&Arc<dyn FactorProvider>> {
        self.providers.get(&factor)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Fetch through the registered provider, rejecting samples shaped for another factor.
    pub async fn fetch(
        &self,
        factor: FactorKey,
        at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        let provider = self.get(factor).ok_or_else(|| {
            ProviderError::unavailable(format!("no provider registered for {factor}"))
        })?;
        let sample = provider.fetch(factor, at).await?;
        if !sample.fits(factor) {
            return Err(ProviderError::unavailable(format!(
                "{} returned a sample shaped for another factor when asked for {factor}",
                provider.name()
            )));
        }
        Ok(sample)
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for factor in FactorKey::ALL {
            if let Some(provider) = self.providers.get(&factor) {
                map.entry(&factor, &provider.name());
            }
        }
        map.finish()
    }
}
