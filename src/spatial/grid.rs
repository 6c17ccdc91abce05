//! Grid sampling over a region.
//!
//! Bounding boxes are cut into rows and columns of roughly `grid_size` km. Circles are
//! sampled on concentric rings spaced `grid_size` km apart, each ring carrying a number of
//! points that depends only on its index, so shrinking the cell size only ever adds points.

use std::f64::consts::{PI, TAU};

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{BoundingBox, Coordinate, Region, EARTH_RADIUS_KM};
use crate::error::AnalysisError;
use crate::rng::RngManager;

pub const DEFAULT_MAX_CELLS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Cell centers, fully deterministic.
    #[default]
    Lattice,
    /// One point per cell at a uniformly random position inside it.
    Jittered {
        #[serde(default)]
        seed: Option<u64>,
    },
    /// A fixed number of uniformly distributed points, independent of grid size.
    Uniform {
        count: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl SamplingMode {
    /// Fills in `seed` for randomized modes that were configured without one.
    pub fn with_default_seed(self, seed: Option<u64>) -> Self {
        match self {
            SamplingMode::Lattice => SamplingMode::Lattice,
            SamplingMode::Jittered { seed: own } => SamplingMode::Jittered { seed: own.or(seed) },
            SamplingMode::Uniform { count, seed: own } => SamplingMode::Uniform {
                count,
                seed: own.or(seed),
            },
        }
    }

    fn rng(&self) -> Option<ChaCha8Rng> {
        match *self {
            SamplingMode::Lattice => None,
            SamplingMode::Jittered { seed } | SamplingMode::Uniform { seed, .. } => {
                Some(RngManager::seeded_or_entropy(seed).stream("grid"))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridSampler {
    mode: SamplingMode,
    max_cells: usize,
}

impl GridSampler {
    pub fn new(mode: SamplingMode) -> Self {
        Self {
            mode,
            max_cells: DEFAULT_MAX_CELLS,
        }
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Sample points covering `region`. Points come back in generation order, which is the
    /// order cells keep for the rest of the run.
    pub fn generate(
        &self,
        region: &Region,
        grid_size: f64,
    ) -> Result<Vec<Coordinate>, AnalysisError> {
        if !grid_size.is_finite() || grid_size <= 0.0 {
            return Err(AnalysisError::invalid_region(format!(
                "grid size must be a positive number, got {grid_size}"
            )));
        }
        region.validate()?;

        let mut rng = self.mode.rng();
        let points = match (*region, self.mode) {
            (Region::Bbox(bbox), _) if bbox.height_km() <= 0.0 || bbox.width_km() <= 0.0 => {
                vec![bbox.centroid()]
            }
            (Region::Circle { center, radius_km }, _) if radius_km <= 0.0 => vec![center],
            (Region::Bbox(bbox), SamplingMode::Uniform { count, .. }) => {
                self.check_density(count as f64)?;
                let rng = uniform_rng(&mut rng, count)?;
                (0..count)
                    .map(|_| {
                        Coordinate::new(
                            rng.gen_range(bbox.min_lat..=bbox.max_lat),
                            rng.gen_range(bbox.min_lng..=bbox.max_lng),
                        )
                    })
                    .collect()
            }
            (Region::Circle { center, radius_km }, SamplingMode::Uniform { count, .. }) => {
                self.check_density(count as f64)?;
                let rng = uniform_rng(&mut rng, count)?;
                (0..count)
                    .map(|_| {
                        let distance = radius_km * rng.gen::<f64>().sqrt();
                        let bearing = rng.gen::<f64>() * TAU;
                        destination(center, distance, bearing)
                    })
                    .collect()
            }
            (Region::Bbox(bbox), _) => self.sample_box(&bbox, grid_size, &mut rng)?,
            (Region::Circle { center, radius_km }, _) => {
                self.sample_rings(center, radius_km, grid_size, &mut rng)?
            }
        };
        Ok(points)
    }

    fn sample_box(
        &self,
        bbox: &BoundingBox,
        grid_size: f64,
        rng: &mut Option<ChaCha8Rng>,
    ) -> Result<Vec<Coordinate>, AnalysisError> {
        let rows = (bbox.height_km() / grid_size).ceil().max(1.0);
        let cols = (bbox.width_km() / grid_size).ceil().max(1.0);
        self.check_density(rows * cols)?;
        let (rows, cols) = (rows as usize, cols as usize);

        let d_lat = (bbox.max_lat - bbox.min_lat) / rows as f64;
        let d_lng = (bbox.max_lng - bbox.min_lng) / cols as f64;
        let mut points = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let (u, v) = offset(rng);
                points.push(Coordinate::new(
                    bbox.min_lat + (row as f64 + u) * d_lat,
                    bbox.min_lng + (col as f64 + v) * d_lng,
                ));
            }
        }
        Ok(points)
    }

    fn sample_rings(
        &self,
        center: Coordinate,
        radius_km: f64,
        grid_size: f64,
        rng: &mut Option<ChaCha8Rng>,
    ) -> Result<Vec<Coordinate>, AnalysisError> {
        let rings = (radius_km / grid_size).floor();
        self.check_density(1.0 + PI * rings * (rings + 1.0))?;
        let rings = rings as usize;

        let mut points = Vec::new();
        let (u, v) = offset(rng);
        // Ring 0 is the center; jitter keeps it inside the central disc.
        let core = (u - 0.5).abs() * grid_size.min(radius_km);
        points.push(destination(center, core, v * TAU));
        for ring in 1..=rings {
            let slots = ring_slots(ring);
            for slot in 0..slots {
                let (u, v) = offset(rng);
                let distance = ((ring as f64 + u - 0.5) * grid_size).min(radius_km);
                let bearing = (slot as f64 + v) * TAU / slots as f64;
                points.push(destination(center, distance, bearing));
            }
        }
        Ok(points)
    }

    fn check_density(&self, cells: f64) -> Result<(), AnalysisError> {
        if cells > self.max_cells as f64 {
            return Err(AnalysisError::GridTooDense {
                cells: cells.min(usize::MAX as f64) as usize,
                limit: self.max_cells,
            });
        }
        Ok(())
    }
}

impl Default for GridSampler {
    fn default() -> Self {
        Self::new(SamplingMode::Lattice)
    }
}

fn ring_slots(ring: usize) -> usize {
    (TAU * ring as f64).floor() as usize
}

fn offset(rng: &mut Option<ChaCha8Rng>) -> (f64, f64) {
    match rng.as_mut() {
        Some(rng) => (rng.gen(), rng.gen()),
        None => (0.5, 0.5),
    }
}

fn uniform_rng(
    rng: &mut Option<ChaCha8Rng>,
    count: usize,
) -> Result<&mut ChaCha8Rng, AnalysisError> {
    if count == 0 {
        return Err(AnalysisError::invalid_parameters(
            "uniform sampling needs a positive point count",
        ));
    }
    rng.as_mut()
        .ok_or_else(|| AnalysisError::invalid_parameters("uniform sampling needs a random source"))
}

/// Point reached travelling `distance_km` from `origin` along `bearing` (radians from north).
fn destination(origin: Coordinate, distance_km: f64, bearing: f64) -> Coordinate {
    let delta = distance_km / EARTH_RADIUS_KM;
    let lat1 = origin.lat.to_radians();
    let lng1 = origin.lng.to_radians();
    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing.cos()).asin();
    let lng2 = lng1
        + (bearing.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());
    Coordinate::new(
        lat2.to_degrees().clamp(-90.0, 90.0),
        lng2.to_degrees().clamp(-180.0, 180.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn india_box() -> Region {
        Region::Bbox(BoundingBox::new(20.0, 78.0, 21.0, 79.0))
    }

    #[test]
    fn test_lattice_covers_box() {
        let sampler = GridSampler::default();
        let points = sampler.generate(&india_box(), 10.0).unwrap();
        // 111.3 km tall, ~104.4 km wide at 20.5°N
        assert_eq!(points.len(), 12 * 11);
        assert!(points.iter().all(|p| india_box().contains(p)));
    }

    #[test]
    fn test_zero_area_region_yields_centroid() {
        let sampler = GridSampler::default();
        let region = Region::point(Coordinate::new(20.0, 78.0));
        let points = sampler.generate(&region, 1.0).unwrap();
        assert_eq!(points, vec![Coordinate::new(20.0, 78.0)]);

        let line = Region::Bbox(BoundingBox::new(20.0, 78.0, 21.0, 78.0));
        let points = sampler.generate(&line, 1.0).unwrap();
        assert_eq!(points, vec![Coordinate::new(20.5, 78.0)]);
    }

    #[test]
    fn test_smaller_cells_never_fewer_points() {
        let sampler = GridSampler::default();
        let mut previous = 0;
        for size in [50.0, 20.0, 10.0, 5.0, 2.0] {
            let count = sampler.generate(&india_box(), size).unwrap().len();
            assert!(count >= previous, "{size} km gave {count} < {previous}");
            previous = count;
        }
    }

    #[test]
    fn test_zero_radius_circle_yields_center() {
        let center = Coordinate::new(20.25, 79.4);
        let region = Region::Circle {
            center,
            radius_km: 0.0,
        };
        for mode in [SamplingMode::Lattice, SamplingMode::Jittered { seed: Some(4) }] {
            let points = GridSampler::new(mode).generate(&region, 1.0).unwrap();
            assert_eq!(points, vec![center]);
        }
    }

    #[test]
    fn test_high_latitude_rings_stay_within_bounds() {
        let region = Region::Circle {
            center: Coordinate::new(80.0, 150.0),
            radius_km: 500.0,
        };
        let bounds = region.bounds();
        assert!(bounds.max_lng < 180.0);

        let points = GridSampler::default().generate(&region, 50.0).unwrap();
        assert!(points.iter().all(|p| region.contains(p)));
        assert!(points
            .iter()
            .all(|p| p.lng >= bounds.min_lng - 1e-9 && p.lng <= bounds.max_lng + 1e-9));
        assert!(points.iter().all(|p| p.lng < 180.0));
    }

    #[test]
    fn test_invalid_grid_size() {
        let sampler = GridSampler::default();
        for size in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                sampler.generate(&india_box(), size),
                Err(AnalysisError::InvalidRegion(_))
            ));
        }
    }

    #[test]
    fn test_density_limit() {
        let sampler = GridSampler::default().with_max_cells(100);
        assert!(matches!(
            sampler.generate(&india_box(), 1.0),
            Err(AnalysisError::GridTooDense { limit: 100, .. })
        ));
    }

    #[test]
    fn test_jittered_is_reproducible_with_seed() {
        let sampler = GridSampler::new(SamplingMode::Jittered { seed: Some(9) });
        let a = sampler.generate(&india_box(), 20.0).unwrap();
        let b = sampler.generate(&india_box(), 20.0).unwrap();
        assert_eq!(a, b);
        let lattice = GridSampler::default().generate(&india_box(), 20.0).unwrap();
        assert_eq!(a.len(), lattice.len());
        assert_ne!(a, lattice);
        assert!(a.iter().all(|p| india_box().contains(p)));
    }

    #[test]
    fn test_uniform_count() {
        let sampler = GridSampler::new(SamplingMode::Uniform {
            count: 25,
            seed: Some(1),
        });
        let points = sampler.generate(&india_box(), 1.0).unwrap();
        assert_eq!(points.len(), 25);
        assert!(points.iter().all(|p| india_box().contains(p)));
    }

    #[test]
    fn test_rings_stay_inside_circle() {
        let region = Region::Circle {
            center: Coordinate::new(20.0, 78.0),
            radius_km: 25.0,
        };
        let sampler = GridSampler::default();
        let points = sampler.generate(&region, 5.0).unwrap();
        // center + rings 1..=5 with floor(2πk) slots
        assert_eq!(points.len(), 1 + 6 + 12 + 18 + 25 + 31);
        assert!(points.iter().all(|p| region.contains(p)));

        let jittered = GridSampler::new(SamplingMode::Jittered { seed: Some(3) });
        let points = jittered.generate(&region, 5.0).unwrap();
        assert!(points.iter().all(|p| region.contains(p)));
    }

    #[test]
    fn test_default_seed_only_fills_missing() {
        let mode = SamplingMode::Jittered { seed: Some(1) }.with_default_seed(Some(2));
        assert_eq!(mode, SamplingMode::Jittered { seed: Some(1) });
        let mode = SamplingMode::Uniform { count: 3, seed: None }.with_default_seed(Some(2));
        assert_eq!(mode, SamplingMode::Uniform { count: 3, seed: Some(2) });
    }
}
