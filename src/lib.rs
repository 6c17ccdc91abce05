pub mod aggregate;
pub mod engine;
pub mod error;
pub mod factors;
pub mod logging;
pub mod normalize;
pub mod population;
pub mod providers;
pub mod report;
pub mod rng;
pub mod sample;
pub mod scenario;
pub mod spatial;
pub mod web;

pub use aggregate::{PopulationSummary, SuitabilityAggregator, SuitabilityBand};
pub use engine::{AnalysisHandle, EngineBuilder, EngineSettings, RunPhase, ScoringEngine, SessionId};
pub use error::AnalysisError;
pub use factors::{AnalysisParameters, FactorKey, FactorScores, FactorWeights, IncludeFactors};
pub use population::{RunOutcome, ScoredCell, ScoredPopulation};
pub use providers::{FactorProvider, ProviderError, ProviderSet};
pub use scenario::{Scenario, ScenarioLoader};
pub use spatial::{BoundingBox, Coordinate, GridSampler, Region, SamplingMode};
