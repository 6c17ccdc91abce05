//! Throughput checks for the scoring pipeline
//!
//! Run with: cargo bench

use std::hint::black_box;
use std::time::Instant;

use canopy::{
    engine::{EngineBuilder, EngineSettings},
    normalize::Normalizer,
    providers::{ProviderSet, SyntheticProvider},
    rng::RngManager,
    AnalysisParameters, BoundingBox, FactorKey, GridSampler, Region,
};

fn survey_block() -> Region {
    Region::Bbox(BoundingBox::new(20.0, 78.0, 20.5, 78.5))
}

#[cfg(test)]
mod benches {
    use super::*;

    #[test]
    fn benchmark_grid_generation() {
        let sampler = GridSampler::default();
        let start = Instant::now();
        let mut cells = 0;
        for _ in 0..100 {
            cells = black_box(sampler.generate(&survey_block(), 1.0).unwrap()).len();
        }
        println!("grid of {cells} cells: {:?} per generation", start.elapsed() / 100);
    }

    #[test]
    fn benchmark_normalization() {
        let provider = SyntheticProvider::new(RngManager::new(1));
        let grid = GridSampler::default().generate(&survey_block(), 1.0).unwrap();
        let normalizer = Normalizer::default();
        for factor in FactorKey::ALL {
            let column: Vec<_> = grid.iter().map(|at| Some(provider.sample(factor, *at))).collect();
            let start = Instant::now();
            black_box(normalizer.normalize_column(&column));
            println!("normalize {} x {factor}: {:?}", column.len(), start.elapsed());
        }
    }

    #[test]
    fn benchmark_full_analysis() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine = EngineBuilder::new(EngineSettings::default())
            .with_providers(ProviderSet::for_all(SyntheticProvider::new(RngManager::new(1))))
            .build();
        let start = Instant::now();
        let population = runtime
            .block_on(engine.run_analysis(&survey_block(), &AnalysisParameters::new(1.0)))
            .unwrap();
        println!(
            "analysis of {} cells: {:?} ({:?} per cell)",
            population.len(),
            start.elapsed(),
            start.elapsed() / population.len() as u32
        );
    }
}
