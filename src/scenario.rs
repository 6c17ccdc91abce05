use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::{
    engine::{EngineBuilder, EngineSettings, ScoringEngine},
    factors::{AnalysisParameters, FactorKey},
    providers::{
        http::{
            GoogleAirQualityProvider, GoogleSolarProvider, OverpassLandCoverProvider,
            SoilGridsProvider, DEFAULT_OVERPASS_RADIUS_M, OVERPASS_URL, SOIL_GRIDS_URL,
        },
        AirQualitySource, BufferSource, ConflictZone, ConflictZoneBuffer, FactorProvider,
        FixedProvider, LandCoverSource, ProviderSet, SoilSource, SolarSource, SyntheticProvider,
    },
    rng::RngManager,
    spatial::{Region, SamplingMode},
};

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_safe_distance_km() -> f64 {
    10.0
}

fn default_soil_grids_url() -> String {
    SOIL_GRIDS_URL.to_string()
}

fn default_overpass_url() -> String {
    OVERPASS_URL.to_string()
}

fn default_overpass_radius_m() -> u32 {
    DEFAULT_OVERPASS_RADIUS_M
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    pub region: Region,
    #[serde(default)]
    pub parameters: AnalysisParameters,
    #[serde(default)]
    pub sampling: Option<SamplingMode>,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Where each factor's measurements come from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub land_cover: ProviderSpec,
    #[serde(default)]
    pub soil: ProviderSpec,
    #[serde(default)]
    pub buffer: ProviderSpec,
    #[serde(default)]
    pub solar: ProviderSpec,
    #[serde(default)]
    pub air_quality: ProviderSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSpec {
    #[default]
    Synthetic,
    Fixed {
        score: f64,
    },
    ConflictZones {
        #[serde(default)]
        zones: Vec<ConflictZone>,
        #[serde(default = "default_safe_distance_km")]
        safe_distance_km: f64,
    },
    SoilGrids {
        #[serde(default = "default_soil_grids_url")]
        base_url: String,
    },
    Overpass {
        #[serde(default = "default_overpass_url")]
        base_url: String,
        #[serde(default = "default_overpass_radius_m")]
        radius_m: u32,
    },
    GoogleSolar {
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
    },
    GoogleAirQuality {
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
    },
}

impl ProviderSpec {
    fn kind(&self) -> &'static str {
        match self {
            ProviderSpec::Synthetic => "synthetic",
            ProviderSpec::Fixed { .. } => "fixed",
            ProviderSpec::ConflictZones { .. } => "conflict_zones",
            ProviderSpec::SoilGrids { .. } => "soil_grids",
            ProviderSpec::Overpass { .. } => "overpass",
            ProviderSpec::GoogleSolar { .. } => "google_solar",
            ProviderSpec::GoogleAirQuality { .. } => "google_air_quality",
        }
    }

    pub fn build(
        &self,
        factor: FactorKey,
        rng: RngManager,
        timeout: Duration,
    ) -> Result<Arc<dyn FactorProvider>> {
        let provider: Arc<dyn FactorProvider> = match (self, factor) {
            (ProviderSpec::Synthetic, _) => Arc::new(SyntheticProvider::new(rng)),
            (ProviderSpec::Fixed { score }, _) => Arc::new(FixedProvider::score(*score)),
            (
                ProviderSpec::ConflictZones {
                    zones,
                    safe_distance_km,
                },
                FactorKey::Buffer,
            ) => Arc::new(BufferSource(ConflictZoneBuffer::new(
                zones.clone(),
                *safe_distance_km,
            ))),
            (ProviderSpec::SoilGrids { base_url }, FactorKey::Soil) => Arc::new(SoilSource(
                SoilGridsProvider::new(base_url.clone(), timeout)
                    .context("Failed to build SoilGrids client")?,
            )),
            (ProviderSpec::Overpass { base_url, radius_m }, FactorKey::LandCover) => {
                Arc::new(LandCoverSource(
                    OverpassLandCoverProvider::new(base_url.clone(), *radius_m, timeout)
                        .context("Failed to build Overpass client")?,
                ))
            }
            (ProviderSpec::GoogleSolar { api_key_env }, FactorKey::Solar) => {
                Arc::new(SolarSource(
                    GoogleSolarProvider::new(api_key(api_key_env)?, timeout)
                        .context("Failed to build Google Solar client")?,
                ))
            }
            (ProviderSpec::GoogleAirQuality { api_key_env }, FactorKey::AirQuality) => {
                Arc::new(AirQualitySource(
                    GoogleAirQualityProvider::new(api_key(api_key_env)?, timeout)
                        .context("Failed to build Google Air Quality client")?,
                ))
            }
            (spec, factor) => bail!("provider '{}' cannot serve the {factor} factor", spec.kind()),
        };
        Ok(provider)
    }
}

fn api_key(var: &str) -> Result<String> {
    env::var(var).with_context(|| format!("Environment variable {var} is not set"))
}

impl ProviderConfig {
    pub fn spec(&self, factor: FactorKey) -> &ProviderSpec {
        match factor {
            FactorKey::LandCover => &self.land_cover,
            FactorKey::Soil => &self.soil,
            FactorKey::Buffer => &self.buffer,
            FactorKey::Solar => &self.solar,
            FactorKey::AirQuality => &self.air_quality,
        }
    }

    pub fn build(&self, rng: RngManager, timeout: Duration) -> Result<ProviderSet> {
        let mut set = ProviderSet::new();
        for factor in FactorKey::ALL {
            let provider = self
                .spec(factor)
                .build(factor, rng, timeout)
                .with_context(|| format!("Failed to configure the {factor} provider"))?;
            set.insert(factor, provider);
        }
        Ok(set)
    }
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn parameters(&self, grid_size: Option<f64>) -> AnalysisParameters {
        let mut parameters = self.parameters.clone();
        if let Some(grid_size) = grid_size {
            parameters.grid_size = grid_size;
        }
        parameters
    }

    pub fn engine_settings(&self, seed: Option<u64>) -> EngineSettings {
        let mut settings = self.engine.clone();
        if let Some(sampling) = self.sampling {
            settings.sampling = sampling;
        }
        settings.seed = seed.or(self.seed).or(settings.seed);
        settings
    }

    pub fn build_engine(&self, seed: Option<u64>) -> Result<ScoringEngine> {
        let settings = self.engine_settings(seed);
        let rng = RngManager::seeded_or_entropy(settings.seed);
        let providers = self.providers.build(rng, settings.provider_timeout())?;
        Ok(EngineBuilder::new(settings)
            .with_providers(providers)
            .build())
    }
}
