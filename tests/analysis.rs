use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use async_trait::async_trait;
use canopy::{
    engine::{EngineBuilder, EngineSettings, RunPhase, ScoringEngine, SessionId},
    providers::{FactorProvider, FixedProvider, ProviderError, ProviderSet, SyntheticProvider},
    rng::RngManager,
    sample::{RawFactorSample, SolarSample},
    AnalysisError, AnalysisParameters, BoundingBox, Coordinate, FactorKey, FactorWeights,
    GridSampler, IncludeFactors, Region, RunOutcome, SamplingMode,
};

fn nagpur_block() -> Region {
    Region::Bbox(BoundingBox::new(21.0, 79.0, 21.05, 79.05))
}

fn engine_with(providers: ProviderSet) -> ScoringEngine {
    EngineBuilder::new(EngineSettings::default())
        .with_providers(providers)
        .build()
}

struct Unavailable;

#[async_trait]
impl FactorProvider for Unavailable {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn fetch(
        &self,
        _factor: FactorKey,
        _at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        Err(ProviderError::unavailable("service down"))
    }
}

/// Fails its first call only.
#[derive(Default)]
struct FailsOnce {
    failed: AtomicBool,
}

#[async_trait]
impl FactorProvider for FailsOnce {
    fn name(&self) -> &str {
        "fails_once"
    }

    async fn fetch(
        &self,
        _factor: FactorKey,
        _at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        if self.failed.swap(true, Ordering::SeqCst) {
            Ok(RawFactorSample::Score(0.9))
        } else {
            Err(ProviderError::unavailable("flaky"))
        }
    }
}

/// Scores a cell from its latitude; cells further north answer sooner.
struct NorthFirst;

#[async_trait]
impl FactorProvider for NorthFirst {
    fn name(&self) -> &str {
        "north_first"
    }

    async fn fetch(
        &self,
        _factor: FactorKey,
        at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        let delay = ((21.05 - at.lat) * 400.0).max(0.0) as u64;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(RawFactorSample::Score(lat_score(at)))
    }
}

fn lat_score(at: Coordinate) -> f64 {
    ((at.lat - 21.0) / 0.05).clamp(0.0, 1.0)
}

#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl FactorProvider for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    async fn fetch(
        &self,
        _factor: FactorKey,
        _at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RawFactorSample::Score(0.5))
    }
}

struct Sleeps(Duration);

#[async_trait]
impl FactorProvider for Sleeps {
    fn name(&self) -> &str {
        "sleeps"
    }

    async fn fetch(
        &self,
        _factor: FactorKey,
        _at: Coordinate,
    ) -> Result<RawFactorSample, ProviderError> {
        tokio::time::sleep(self.0).await;
        Ok(RawFactorSample::Score(1.0))
    }
}

#[tokio::test]
async fn single_point_with_perfect_scores_scores_one() {
    let engine = engine_with(ProviderSet::for_all(FixedProvider::score(1.0)));
    let population = engine
        .run_analysis(
            &Region::point(Coordinate::new(20.0, 78.0)),
            &AnalysisParameters::new(1.0),
        )
        .await
        .unwrap();

    assert_eq!(population.len(), 1);
    let cell = &population.cells()[0];
    assert_eq!(cell.id, "cell-0");
    assert_eq!(cell.coordinates, Coordinate::new(20.0, 78.0));
    assert_relative_eq!(cell.suitability_score, 1.0, epsilon = 1e-12);
    assert_eq!(cell.factors.len(), 5);
    assert!(!cell.degraded);
    assert_eq!(population.outcome(), RunOutcome::Complete);
    assert_eq!(population.summary().highly_suitable, 1);
    assert_eq!(population.metadata().fetches_attempted, 5);
}

#[tokio::test]
async fn excluding_a_factor_drops_exactly_its_contribution() {
    let engine = engine_with(ProviderSet::for_all(FixedProvider::score(1.0)));
    let region = Region::point(Coordinate::new(20.0, 78.0));
    let mut parameters = AnalysisParameters::new(1.0);
    let full = engine.run_analysis(&region, &parameters).await.unwrap();

    parameters.include_factors = IncludeFactors::all().with(FactorKey::AirQuality, false);
    let reduced = engine.run_analysis(&region, &parameters).await.unwrap();

    let drop = full.cells()[0].suitability_score - reduced.cells()[0].suitability_score;
    assert_relative_eq!(drop, 0.1 * 1.0, epsilon = 1e-12);
    assert_eq!(reduced.cells()[0].factors.get(FactorKey::AirQuality), None);
    assert_eq!(reduced.metadata().fetches_attempted, 4);
}

#[tokio::test]
async fn equal_raw_population_normalizes_to_neutral() {
    let settings = EngineSettings {
        sampling: SamplingMode::Uniform {
            count: 3,
            seed: Some(5),
        },
        ..EngineSettings::default()
    };
    let engine = EngineBuilder::new(settings)
        .with_provider(
            FactorKey::Solar,
            FixedProvider::new(SolarSample {
                sunshine_hours_per_year: 10.0,
            }),
        )
        .build();
    let parameters = AnalysisParameters {
        grid_size: 1.0,
        weights: FactorWeights::default().with(FactorKey::Solar, 1.0),
        include_factors: IncludeFactors::none().with(FactorKey::Solar, true),
    };

    let population = engine.run_analysis(&nagpur_block(), &parameters).await.unwrap();
    let solar: Vec<f64> = population
        .cells()
        .iter()
        .map(|c| c.factors.get(FactorKey::Solar).unwrap())
        .collect();
    assert_eq!(solar, vec![0.5, 0.5, 0.5]);
    assert_eq!(population.outcome(), RunOutcome::Complete);
}

#[tokio::test]
async fn total_failure_falls_back_to_synthetic_population() {
    let settings = EngineSettings {
        seed: Some(3),
        ..EngineSettings::default()
    };
    let engine = EngineBuilder::new(settings)
        .with_providers(ProviderSet::for_all(Unavailable))
        .build();
    let region = nagpur_block();
    let expected = GridSampler::default().generate(&region, 1.0).unwrap();

    let population = engine
        .run_analysis(&region, &AnalysisParameters::new(1.0))
        .await
        .unwrap();

    assert_eq!(population.len(), expected.len());
    assert!(population.is_synthetic());
    assert_eq!(population.outcome(), RunOutcome::Failed);
    assert_eq!(
        population.metadata().fetches_failed,
        population.metadata().fetches_attempted
    );
    for (cell, at) in population.cells().iter().zip(&expected) {
        assert!(cell.synthetic);
        assert_eq!(cell.coordinates, *at);
        assert!((0.0..=1.0).contains(&cell.suitability_score));
    }
}

#[tokio::test]
async fn one_failed_fetch_degrades_only_its_cell() {
    let providers = ProviderSet::for_all(FixedProvider::score(0.9))
        .with(FactorKey::Soil, FailsOnce::default());
    let engine = engine_with(providers);

    let population = engine
        .run_analysis(&nagpur_block(), &AnalysisParameters::new(1.0))
        .await
        .unwrap();

    let degraded: Vec<_> = population.cells().iter().filter(|c| c.degraded).collect();
    assert_eq!(degraded.len(), 1);
    let cell = degraded[0];
    assert_eq!(cell.degradation.len(), 1);
    assert_eq!(cell.degradation[0].factor, FactorKey::Soil);
    assert!(cell.degradation[0].reason.contains("flaky"));
    assert_eq!(cell.factors.get(FactorKey::Soil), Some(0.5));
    assert_eq!(population.outcome(), RunOutcome::Degraded);
    assert!(!population.is_synthetic());
    assert_eq!(population.metadata().fetches_failed, 1);
    assert_eq!(population.metadata().degraded_cells, 1);
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let providers = ProviderSet::for_all(SyntheticProvider::new(RngManager::new(17)));
    let engine = engine_with(providers);
    let parameters = AnalysisParameters::new(1.0);

    let first = engine.run_analysis(&nagpur_block(), &parameters).await.unwrap();
    let second = engine.run_analysis(&nagpur_block(), &parameters).await.unwrap();

    assert_eq!(first.cells(), second.cells());
    for (a, b) in first.cells().iter().zip(second.cells()) {
        assert_eq!(a.suitability_score.to_bits(), b.suitability_score.to_bits());
    }
    assert_ne!(first.metadata().run_id, second.metadata().run_id);
}

#[tokio::test]
async fn cells_keep_grid_order_when_fetches_finish_out_of_order() {
    let settings = EngineSettings {
        max_in_flight: 64,
        ..EngineSettings::default()
    };
    let engine = EngineBuilder::new(settings)
        .with_provider(FactorKey::LandCover, NorthFirst)
        .build();
    let parameters = AnalysisParameters {
        grid_size: 1.0,
        weights: FactorWeights::default().with(FactorKey::LandCover, 1.0),
        include_factors: IncludeFactors::none().with(FactorKey::LandCover, true),
    };
    let region = nagpur_block();
    let grid = GridSampler::default().generate(&region, 1.0).unwrap();

    let population = engine.run_analysis(&region, &parameters).await.unwrap();

    assert_eq!(population.len(), grid.len());
    for (index, (cell, at)) in population.cells().iter().zip(&grid).enumerate() {
        assert_eq!(cell.id, format!("cell-{index}"));
        assert_eq!(cell.coordinates, *at);
        assert_relative_eq!(cell.suitability_score, lat_score(*at), epsilon = 1e-12);
    }
}

#[tokio::test]
async fn in_flight_fetches_respect_the_limit() {
    let counting = Arc::new(Counting::default());
    let settings = EngineSettings {
        max_in_flight: 3,
        ..EngineSettings::default()
    };
    let mut providers = ProviderSet::new();
    for factor in FactorKey::ALL {
        providers.insert(factor, counting.clone());
    }
    let engine = EngineBuilder::new(settings).with_providers(providers).build();

    let population = engine
        .run_analysis(&nagpur_block(), &AnalysisParameters::new(1.0))
        .await
        .unwrap();

    assert_eq!(counting.calls.load(Ordering::SeqCst), population.len() * 5);
    assert!(counting.peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn slow_provider_times_out_into_fallback() {
    let settings = EngineSettings {
        provider_timeout_ms: 20,
        fallback_score: 0.25,
        ..EngineSettings::default()
    };
    let providers = ProviderSet::for_all(FixedProvider::score(1.0))
        .with(FactorKey::Solar, Sleeps(Duration::from_millis(500)));
    let engine = EngineBuilder::new(settings).with_providers(providers).build();

    let population = engine
        .run_analysis(
            &Region::point(Coordinate::new(20.0, 78.0)),
            &AnalysisParameters::new(1.0),
        )
        .await
        .unwrap();

    let cell = &population.cells()[0];
    assert!(cell.degraded);
    assert_eq!(cell.factors.get(FactorKey::Solar), Some(0.25));
    assert!(cell.degradation[0].reason.contains("timed out"));
    assert_relative_eq!(cell.suitability_score, 0.9 + 0.1 * 0.25, epsilon = 1e-12);
    assert_eq!(population.outcome(), RunOutcome::Degraded);
}

#[tokio::test]
async fn invalid_region_is_rejected_before_any_fetch() {
    let counting = Arc::new(Counting::default());
    let mut providers = ProviderSet::new();
    providers.insert(FactorKey::Soil, counting.clone());
    let engine = engine_with(providers);

    let err = engine
        .run_analysis(
            &Region::Bbox(BoundingBox::new(95.0, 78.0, 96.0, 79.0)),
            &AnalysisParameters::new(1.0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidRegion(_)));

    let err = engine
        .run_analysis(&nagpur_block(), &AnalysisParameters::new(0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidRegion(_)));
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn nothing_included_scores_zero_without_fetching() {
    let counting = Arc::new(Counting::default());
    let mut providers = ProviderSet::new();
    providers.insert(FactorKey::Soil, counting.clone());
    let engine = engine_with(providers);
    let parameters = AnalysisParameters {
        include_factors: IncludeFactors::none(),
        ..AnalysisParameters::new(1.0)
    };

    let population = engine.run_analysis(&nagpur_block(), &parameters).await.unwrap();
    assert!(population.cells().iter().all(|c| c.suitability_score == 0.0));
    assert_eq!(population.outcome(), RunOutcome::Complete);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn busy_session_rejects_second_run() {
    let engine = Arc::new(engine_with(ProviderSet::for_all(Sleeps(Duration::from_secs(30)))));
    let region = nagpur_block();

    let first = engine
        .spawn_analysis("field-team", region, AnalysisParameters::new(1.0))
        .unwrap();
    let second = engine.spawn_analysis("field-team", region, AnalysisParameters::new(1.0));
    assert!(matches!(second, Err(AnalysisError::SessionBusy(ref s)) if s == "field-team"));

    let other = engine
        .spawn_analysis("office", region, AnalysisParameters::new(1.0))
        .unwrap();
    assert!(engine.cancel(&SessionId::new("office")));
    assert!(matches!(other.outcome().await, Err(AnalysisError::Cancelled)));
    drop(first);
}

#[tokio::test]
async fn cancelled_run_publishes_nothing_and_frees_the_session() {
    let engine = Arc::new(engine_with(ProviderSet::for_all(Sleeps(Duration::from_secs(30)))));
    let session = SessionId::new("survey");

    let handle = engine
        .spawn_analysis(session.clone(), nagpur_block(), AnalysisParameters::new(1.0))
        .unwrap();
    let mut phases = handle.phases();
    phases
        .wait_for(|phase| *phase == RunPhase::Scoring)
        .await
        .unwrap();

    assert!(engine.cancel(&session));
    assert!(!engine.is_busy(&session));
    assert!(matches!(handle.outcome().await, Err(AnalysisError::Cancelled)));
    assert!(!engine.cancel(&session));

    let replacement = Arc::new(engine_with(ProviderSet::for_all(FixedProvider::score(0.5))));
    let population = replacement
        .spawn_analysis(session, nagpur_block(), AnalysisParameters::new(1.0))
        .unwrap()
        .outcome()
        .await
        .unwrap();
    assert!(!population.is_empty());
}

#[tokio::test]
async fn dropping_the_handle_cancels_the_run() {
    let engine = Arc::new(engine_with(ProviderSet::for_all(Sleeps(Duration::from_secs(30)))));
    let session = SessionId::new("dropped");

    let handle = engine
        .spawn_analysis(session.clone(), nagpur_block(), AnalysisParameters::new(1.0))
        .unwrap();
    drop(handle);

    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.is_busy(&session) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}
