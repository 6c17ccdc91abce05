use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use canopy::{
    engine::{EngineBuilder, EngineSettings},
    logging::init_tracing,
    report::{AnalysisReport, ReportWriter},
    rng::RngManager,
    scenario::{ProviderConfig, ScenarioLoader},
    web::{self, WebServerConfig},
    SuitabilityBand,
};

const TOP_SITES: usize = 5;

#[derive(Debug, Parser)]
#[command(author, version, about = "Tree-planting suitability scoring")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyse the region of a scenario and write a JSON report
    Run {
        /// Path to the scenario YAML file
        #[arg(long, default_value = "scenarios/deccan_plateau.yaml")]
        scenario: PathBuf,

        /// Override the grid cell size in km
        #[arg(long)]
        grid_size: Option<f64>,

        /// Override the scenario seed
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for reports
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Serve the analysis API
    Serve {
        /// Scenario whose engine and provider settings the server uses
        #[arg(long)]
        scenario: Option<PathBuf>,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Log level when RUST_LOG is unset
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            scenario,
            grid_size,
            seed,
            output_dir,
        } => run(scenario, grid_size, seed, output_dir).await,
        Command::Serve {
            scenario,
            host,
            port,
            log_level,
        } => serve(scenario, host, port, log_level).await,
    }
}

async fn run(
    scenario_path: PathBuf,
    grid_size: Option<f64>,
    seed: Option<u64>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let scenario = ScenarioLoader::new(".").load(&scenario_path)?;
    init_tracing(&scenario.logging.level);

    let engine = Arc::new(scenario.build_engine(seed)?);
    let parameters = scenario.parameters(grid_size);
    let handle = engine.spawn_analysis("cli", scenario.region, parameters.clone())?;

    let population = tokio::select! {
        outcome = handle.outcome() => outcome.context("Analysis failed")?,
        _ = tokio::signal::ctrl_c() => {
            // dropping the handle aborts the run
            bail!("Analysis of '{}' interrupted", scenario.name);
        }
    };

    let writer = ReportWriter::new(output_dir.unwrap_or_else(|| scenario.output_dir.clone()));
    let report = AnalysisReport {
        scenario: scenario.name.clone(),
        description: scenario.description.clone(),
        region: scenario.region,
        parameters,
        population,
    };
    let path = writer.write(&report)?;
    info!(path = %path.display(), "report written");

    let summary = report.population.summary();
    println!(
        "Scenario '{}': {} sites analysed ({:?}). {}: {}, {}: {}, {}: {}. Report: {}",
        scenario.name,
        summary.sites_analyzed,
        report.population.outcome(),
        SuitabilityBand::High.label(),
        summary.highly_suitable,
        SuitabilityBand::Moderate.label(),
        summary.moderately_suitable,
        SuitabilityBand::Low.label(),
        summary.low_suitability,
        path.display()
    );
    for cell in report
        .population
        .ranked(SuitabilityBand::High)
        .into_iter()
        .take(TOP_SITES)
    {
        let factors: Vec<String> = cell
            .factors
            .iter()
            .map(|(factor, score)| {
                format!("{factor} {score:.2} ({})", SuitabilityBand::from_score(score).label())
            })
            .collect();
        println!(
            "  {} ({:.4}, {:.4}) score {:.3}: {}",
            cell.id,
            cell.coordinates.lat,
            cell.coordinates.lng,
            cell.suitability_score,
            factors.join(", ")
        );
    }
    Ok(())
}

async fn serve(
    scenario_path: Option<PathBuf>,
    host: String,
    port: u16,
    log_level: String,
) -> Result<()> {
    let engine = match scenario_path {
        Some(path) => {
            let scenario = ScenarioLoader::new(".").load(&path)?;
            init_tracing(&scenario.logging.level);
            scenario.build_engine(None)?
        }
        None => {
            init_tracing(&log_level);
            let settings = EngineSettings::default();
            // offline: synthetic data for every factor
            let providers = ProviderConfig::default().build(
                RngManager::seeded_or_entropy(settings.seed),
                settings.provider_timeout(),
            )?;
            EngineBuilder::new(settings).with_providers(providers).build()
        }
    };
    web::run(WebServerConfig { engine, host, port }).await
}
