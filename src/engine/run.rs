//! One analysis run: sample, fetch, normalize, aggregate.

use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EngineSettings, PhaseTracker, RunPhase};
use crate::aggregate::SuitabilityAggregator;
use crate::error::AnalysisError;
use crate::factors::{AnalysisParameters, FactorKey, FactorScores};
use crate::normalize::{clamp_unit, Normalizer};
use crate::population::{Degradation, RunMetadata, RunOutcome, ScoredCell, ScoredPopulation};
use crate::providers::{ProviderError, ProviderSet};
use crate::rng::RngManager;
use crate::sample::RawFactorSample;
use crate::spatial::{Coordinate, GridSampler, Region};

type Fetched = Result<RawFactorSample, ProviderError>;

pub(crate) struct RunContext<'a> {
    pub settings: &'a EngineSettings,
    pub providers: &'a ProviderSet,
    pub normalizer: &'a Normalizer,
    pub sampler: &'a GridSampler,
    pub tracker: &'a PhaseTracker,
}

impl RunContext<'_> {
    pub(crate) async fn execute(
        &self,
        region: &Region,
        parameters: &AnalysisParameters,
    ) -> Result<ScoredPopulation, AnalysisError> {
        let started = Instant::now();
        let started_at = Utc::now();

        self.tracker.set(RunPhase::Sampling);
        let grid = match self.sample(region, parameters) {
            Ok(grid) => grid,
            Err(err) => {
                self.tracker.set(RunPhase::Failed);
                return Err(err);
            }
        };
        let included = parameters.include_factors.included();
        info!(
            cells = grid.len(),
            factors = included.len(),
            grid_size = parameters.grid_size,
            "starting suitability analysis"
        );

        self.tracker.set(RunPhase::Scoring);
        let fetched = self.collect(&grid, &included).await;
        let attempted = grid.len() * included.len();
        let failed = fetched
            .iter()
            .flatten()
            .filter(|result| result.is_err())
            .count();

        self.tracker.set(RunPhase::Aggregating);
        let (cells, synthetic) = if attempted > 0 && failed == attempted {
            warn!(
                attempted,
                "every factor fetch failed, falling back to a synthetic population"
            );
            (self.synthesize(&grid, parameters), true)
        } else {
            (self.score(&grid, &included, &fetched, parameters), false)
        };

        let degraded_cells = cells.iter().filter(|cell| cell.degraded).count();
        let outcome = if synthetic {
            RunOutcome::Failed
        } else if degraded_cells > 0 {
            RunOutcome::Degraded
        } else {
            RunOutcome::Complete
        };
        let metadata = RunMetadata {
            run_id: Uuid::new_v4(),
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            outcome,
            synthetic,
            degraded_cells,
            fetches_attempted: attempted,
            fetches_failed: failed,
        };
        let population = ScoredPopulation::new(cells, metadata);

        self.tracker.set(match outcome {
            RunOutcome::Complete => RunPhase::Complete,
            RunOutcome::Degraded => RunPhase::Degraded,
            RunOutcome::Failed => RunPhase::Failed,
        });
        info!(
            run_id = %population.metadata().run_id,
            outcome = ?outcome,
            cells = population.len(),
            degraded_cells,
            fetches_failed = failed,
            highly_suitable = population.summary().highly_suitable,
            duration_ms = population.metadata().duration_ms,
            "suitability analysis finished"
        );
        Ok(population)
    }

    fn sample(
        &self,
        region: &Region,
        parameters: &AnalysisParameters,
    ) -> Result<Vec<Coordinate>, AnalysisError> {
        region.validate()?;
        parameters.validate()?;
        self.sampler.generate(region, parameters.grid_size)
    }

    /// Fetches every included factor of every cell. The outer vector is in grid order and each
    /// inner vector follows `included`, whatever order the fetches complete in.
    async fn collect(&self, grid: &[Coordinate], included: &[FactorKey]) -> Vec<Vec<Fetched>> {
        let max_in_flight = self.settings.max_in_flight.clamp(1, Semaphore::MAX_PERMITS);
        let permits = Semaphore::new(max_in_flight);
        let timeout = self.settings.provider_timeout();
        let permits = &permits;

        stream::iter(grid.iter().copied())
            .map(|at| async move {
                join_all(
                    included
                        .iter()
                        .map(|&factor| self.fetch(permits, timeout, factor, at)),
                )
                .await
            })
            .buffered(max_in_flight)
            .collect()
            .await
    }

    async fn fetch(
        &self,
        permits: &Semaphore,
        timeout: Duration,
        factor: FactorKey,
        at: Coordinate,
    ) -> Fetched {
        let _permit = permits
            .acquire()
            .await
            .map_err(|_| ProviderError::unavailable("fetch permits closed"))?;
        match tokio::time::timeout(timeout, self.providers.fetch(factor, at)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
    }

    fn score(
        &self,
        grid: &[Coordinate],
        included: &[FactorKey],
        fetched: &[Vec<Fetched>],
        parameters: &AnalysisParameters,
    ) -> Vec<ScoredCell> {
        let columns: Vec<Vec<Option<f64>>> = (0..included.len())
            .map(|column| {
                let samples: Vec<Option<&RawFactorSample>> = fetched
                    .iter()
                    .map(|row| row[column].as_ref().ok())
                    .collect();
                self.normalizer.normalize_column(&samples)
            })
            .collect();
        let fallback = clamp_unit(self.settings.fallback_score);

        grid.iter()
            .enumerate()
            .map(|(index, &coordinates)| {
                let id = ScoredCell::cell_id(index);
                let mut factors = FactorScores::new();
                let mut degradation = Vec::new();
                for (column, &factor) in included.iter().enumerate() {
                    // normalized entries are present exactly where the fetch succeeded
                    match fetched[index][column]
                        .as_ref()
                        .map(|_| columns[column][index].unwrap_or(fallback))
                    {
                        Ok(score) => factors.insert(factor, score),
                        Err(err) => {
                            let reason = err.to_string();
                            warn!(cell = %id, factor = %factor, %reason, "using fallback score");
                            factors.insert(factor, fallback);
                            degradation.push(Degradation { factor, reason });
                        }
                    }
                }

                let aggregate = SuitabilityAggregator.aggregate(
                    &factors,
                    &parameters.weights,
                    &parameters.include_factors,
                );
                for factor in aggregate.missing {
                    degradation.push(Degradation {
                        factor,
                        reason: "no score for included factor".to_string(),
                    });
                }
                ScoredCell {
                    id,
                    coordinates,
                    suitability_score: aggregate.score,
                    factors,
                    degraded: !degradation.is_empty(),
                    degradation,
                    synthetic: false,
                }
            })
            .collect()
    }

    /// Uniform random factor scores over the same grid, aggregated with the caller's weights.
    fn synthesize(&self, grid: &[Coordinate], parameters: &AnalysisParameters) -> Vec<ScoredCell> {
        let mut rng = RngManager::seeded_or_entropy(self.settings.seed).stream("synthetic");
        grid.iter()
            .enumerate()
            .map(|(index, &coordinates)| {
                let factors: FactorScores = FactorKey::ALL
                    .into_iter()
                    .map(|factor| (factor, rng.gen_range(0.0..=1.0)))
                    .collect();
                let aggregate = SuitabilityAggregator.aggregate(
                    &factors,
                    &parameters.weights,
                    &parameters.include_factors,
                );
                debug!(cell = index, score = aggregate.score, "synthetic cell");
                ScoredCell {
                    id: ScoredCell::cell_id(index),
                    coordinates,
                    suitability_score: aggregate.score,
                    factors,
                    degraded: false,
                    degradation: Vec::new(),
                    synthetic: true,
                }
            })
            .collect()
    }
}
