//! The scoring engine.
//!
//! A run moves through `Idle -> Sampling -> Scoring -> Aggregating` and ends in `Complete`,
//! `Degraded` or `Failed`. Sampling errors are returned before any provider is called; once a
//! grid exists the run always yields a population.

mod run;
mod session;

pub use session::SessionId;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::factors::{AnalysisParameters, FactorKey};
use crate::normalize::{Normalizer, NormalizerSettings, NEUTRAL_SCORE};
use crate::population::ScoredPopulation;
use crate::providers::{FactorProvider, ProviderSet};
use crate::spatial::{GridSampler, Region, SamplingMode, DEFAULT_MAX_CELLS};

use run::RunContext;
use session::SessionRegistry;

fn default_max_in_flight() -> usize {
    16
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}

fn default_fallback_score() -> f64 {
    NEUTRAL_SCORE
}

fn default_max_cells() -> usize {
    DEFAULT_MAX_CELLS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Upper bound on provider calls in flight at once.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    /// Score substituted for a factor whose fetch failed.
    #[serde(default = "default_fallback_score")]
    pub fallback_score: f64,
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,
    #[serde(default)]
    pub sampling: SamplingMode,
    /// Seeds randomized sampling and the synthetic fallback. Entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(flatten)]
    pub normalizer: NormalizerSettings,
}

impl EngineSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            provider_timeout_ms: default_provider_timeout_ms(),
            fallback_score: default_fallback_score(),
            max_cells: default_max_cells(),
            sampling: SamplingMode::default(),
            seed: None,
            normalizer: NormalizerSettings::default(),
        }
    }
}

pub struct EngineBuilder {
    settings: EngineSettings,
    providers: ProviderSet,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            providers: ProviderSet::new(),
        }
    }

    pub fn with_provider(
        mut self,
        factor: FactorKey,
        provider: impl FactorProvider + 'static,
    ) -> Self {
        self.providers.insert(factor, Arc::new(provider));
        self
    }

    /// Registers every provider in `providers`, replacing earlier registrations.
    pub fn with_providers(mut self, providers: ProviderSet) -> Self {
        for factor in FactorKey::ALL {
            if let Some(provider) = providers.get(factor) {
                self.providers.insert(factor, Arc::clone(provider));
            }
        }
        self
    }

    pub fn build(self) -> ScoringEngine {
        let sampler =
            GridSampler::new(self.settings.sampling.with_default_seed(self.settings.seed))
                .with_max_cells(self.settings.max_cells);
        if self.providers.is_empty() {
            warn!("scoring engine built without providers, every fetch will fail");
        }
        debug!(
            sampling = ?sampler.mode(),
            max_in_flight = self.settings.max_in_flight,
            providers = ?self.providers,
            "scoring engine ready"
        );
        ScoringEngine {
            normalizer: Normalizer::new(self.settings.normalizer.clone()),
            sampler,
            providers: self.providers,
            sessions: SessionRegistry::default(),
            settings: self.settings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunPhase {
    Idle,
    Sampling,
    Scoring,
    Aggregating,
    Complete,
    Degraded,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Complete | RunPhase::Degraded | RunPhase::Failed)
    }
}

pub(crate) struct PhaseTracker {
    tx: watch::Sender<RunPhase>,
}

impl PhaseTracker {
    fn new() -> Self {
        let (tx, _) = watch::channel(RunPhase::Idle);
        Self { tx }
    }

    pub(crate) fn set(&self, phase: RunPhase) {
        let previous = self.tx.send_replace(phase);
        debug!(from = ?previous, to = ?phase, "run phase");
    }

    fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.tx.subscribe()
    }
}

pub struct ScoringEngine {
    settings: EngineSettings,
    providers: ProviderSet,
    normalizer: Normalizer,
    sampler: GridSampler,
    sessions: SessionRegistry,
}

impl ScoringEngine {
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// Runs one analysis outside any session. Dropping the future abandons in-flight fetches.
    pub async fn run_analysis(
        &self,
        region: &Region,
        parameters: &AnalysisParameters,
    ) -> Result<ScoredPopulation, AnalysisError> {
        self.execute(region, parameters, &PhaseTracker::new()).await
    }

    /// Starts an analysis for `session` on the runtime. Fails with
    /// [`AnalysisError::SessionBusy`] while the session has another run in flight.
    pub fn spawn_analysis(
        self: &Arc<Self>,
        session: impl Into<SessionId>,
        region: Region,
        parameters: AnalysisParameters,
    ) -> Result<AnalysisHandle, AnalysisError> {
        let session = session.into();
        let guard = self.sessions.begin(&session)?;
        let run = guard.run();
        let tracker = PhaseTracker::new();
        let phase = tracker.subscribe();
        let engine = Arc::clone(self);

        let task = tokio::spawn(async move {
            let _guard = guard;
            engine.execute(&region, &parameters, &tracker).await
        });
        self.sessions.attach(&session, run, task.abort_handle());

        Ok(AnalysisHandle {
            session,
            phase,
            task: Some(task),
        })
    }

    /// Aborts the session's run, if any. The aborted run publishes nothing.
    pub fn cancel(&self, session: &SessionId) -> bool {
        let cancelled = self.sessions.cancel(session);
        if cancelled {
            debug!(%session, "analysis cancelled");
        }
        cancelled
    }

    pub fn is_busy(&self, session: &SessionId) -> bool {
        self.sessions.is_active(session)
    }

    async fn execute(
        &self,
        region: &Region,
        parameters: &AnalysisParameters,
        tracker: &PhaseTracker,
    ) -> Result<ScoredPopulation, AnalysisError> {
        RunContext {
            settings: &self.settings,
            providers: &self.providers,
            normalizer: &self.normalizer,
            sampler: &self.sampler,
            tracker,
        }
        .execute(region, parameters)
        .await
    }
}

/// A spawned analysis. Dropping the handle before the outcome is read cancels the run.
pub struct AnalysisHandle {
    session: SessionId,
    phase: watch::Receiver<RunPhase>,
    task: Option<JoinHandle<Result<ScoredPopulation, AnalysisError>>>,
}

impl AnalysisHandle {
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase change of the run.
    pub fn phases(&self) -> watch::Receiver<RunPhase> {
        self.phase.clone()
    }

    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub async fn outcome(mut self) -> Result<ScoredPopulation, AnalysisError> {
        let Some(task) = self.task.as_mut() else {
            return Err(AnalysisError::Cancelled);
        };
        let joined = task.await;
        self.task = None;
        match joined {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(AnalysisError::Cancelled),
            Err(err) => std::panic::resume_unwind(err.into_panic()),
        }
    }
}

impl Drop for AnalysisHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
