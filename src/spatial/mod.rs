//! Spatial model - coordinates, sampling regions and distances

mod grid;

pub use grid::{GridSampler, SamplingMode, DEFAULT_MAX_CELLS};

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;
pub const KM_PER_DEGREE_LAT: f64 = 111.32;

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in kilometres.
    pub fn haversine_km(&self, other: &Coordinate) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }

    fn check(&self, what: &str) -> Result<(), AnalysisError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AnalysisError::invalid_region(format!(
                "{what} ({}, {}) is outside lat [-90, 90] / lng [-180, 180]",
                self.lat, self.lng
            )))
        }
    }
}

/// Kilometres spanned by one degree of longitude at `lat`.
pub fn km_per_degree_lng(lat: f64) -> f64 {
    (KM_PER_DEGREE_LAT * lat.to_radians().cos()).max(1e-6)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lng: f64, max_lat: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            min_lng,
            max_lat,
            max_lng,
        }
    }

    /// Zero-area box around a single point.
    pub fn point(at: Coordinate) -> Self {
        Self::new(at.lat, at.lng, at.lat, at.lng)
    }

    pub fn centroid(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn height_km(&self) -> f64 {
        (self.max_lat - self.min_lat) * KM_PER_DEGREE_LAT
    }

    pub fn width_km(&self) -> f64 {
        (self.max_lng - self.min_lng) * km_per_degree_lng(self.centroid().lat)
    }

    pub fn contains(&self, at: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&at.lat)
            && (self.min_lng..=self.max_lng).contains(&at.lng)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        Coordinate::new(self.min_lat, self.min_lng).check("bounding box minimum")?;
        Coordinate::new(self.max_lat, self.max_lng).check("bounding box maximum")?;
        if self.min_lat > self.max_lat || self.min_lng > self.max_lng {
            return Err(AnalysisError::invalid_region(format!(
                "bounding box is degenerate: min ({}, {}) exceeds max ({}, {})",
                self.min_lat, self.min_lng, self.max_lat, self.max_lng
            )));
        }
        Ok(())
    }
}

/// Area to sample, either a lat/lng box or a circle around a center point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    #[serde(alias = "boundingBox")]
    Bbox(BoundingBox),
    Circle { center: Coordinate, radius_km: f64 },
}

impl Region {
    pub fn point(at: Coordinate) -> Self {
        Region::Bbox(BoundingBox::point(at))
    }

    pub fn centroid(&self) -> Coordinate {
        match self {
            Region::Bbox(bbox) => bbox.centroid(),
            Region::Circle { center, .. } => *center,
        }
    }

    /// Smallest lat/lng box enclosing the region.
    pub fn bounds(&self) -> BoundingBox {
        match *self {
            Region::Bbox(bbox) => bbox,
            Region::Circle { center, radius_km } => {
                let delta = radius_km / EARTH_RADIUS_KM;
                let d_lat = delta.to_degrees();
                // widest longitude reach of a spherical cap; a cap touching a pole spans 90°
                let reach = (delta.sin() / center.lat.to_radians().cos()).min(1.0);
                let d_lng = reach.asin().to_degrees();
                BoundingBox::new(
                    center.lat - d_lat,
                    center.lng - d_lng,
                    center.lat + d_lat,
                    center.lng + d_lng,
                )
            }
        }
    }

    pub fn contains(&self, at: &Coordinate) -> bool {
        match self {
            Region::Bbox(bbox) => bbox.contains(at),
            // Small tolerance for the degree/km round trip.
            Region::Circle { center, radius_km } => {
                center.haversine_km(at) <= radius_km * (1.0 + 1e-6) + 1e-9
            }
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        match self {
            Region::Bbox(bbox) => bbox.validate(),
            Region::Circle { center, radius_km } => {
                center.check("circle center")?;
                if !radius_km.is_finite() || *radius_km < 0.0 {
                    return Err(AnalysisError::invalid_region(format!(
                        "circle radius must be a non-negative number of km, got {radius_km}"
                    )));
                }
                let bounds = self.bounds();
                if bounds.validate().is_err() {
                    return Err(AnalysisError::invalid_region(
                        "circle crosses a pole or the antimeridian",
                    ));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        let delhi = Coordinate::new(28.6139, 77.2090);
        let mumbai = Coordinate::new(19.0760, 72.8777);
        let d = delhi.haversine_km(&mumbai);
        assert!((d - 1_150.0).abs() < 15.0, "got {d}");
        assert_eq!(delhi.haversine_km(&delhi), 0.0);
    }

    #[test]
    fn test_degenerate_bbox_rejected() {
        let bbox = BoundingBox::new(21.0, 78.0, 20.0, 79.0);
        assert!(matches!(
            bbox.validate(),
            Err(AnalysisError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_out_of_range_bbox_rejected() {
        let bbox = BoundingBox::new(-95.0, 0.0, 10.0, 10.0);
        assert!(bbox.validate().is_err());
    }

    #[test]
    fn test_zero_area_bbox_is_valid() {
        let region = Region::point(Coordinate::new(20.0, 78.0));
        assert!(region.validate().is_ok());
        assert_eq!(region.centroid(), Coordinate::new(20.0, 78.0));
    }

    #[test]
    fn test_circle_across_antimeridian_rejected() {
        let region = Region::Circle {
            center: Coordinate::new(0.0, 179.9),
            radius_km: 50.0,
        };
        assert!(region.validate().is_err());
    }

    #[test]
    fn test_circle_bounds_contain_center() {
        let center = Coordinate::new(20.0, 78.0);
        let region = Region::Circle {
            center,
            radius_km: 10.0,
        };
        let bounds = region.bounds();
        assert!(bounds.contains(&center));
        assert!((bounds.height_km() - 20.0).abs() < 0.05);
    }

    #[test]
    fn test_high_latitude_circle_across_antimeridian_rejected() {
        // 500 km at 80°N reaches about 26.8° of longitude either side
        let region = Region::Circle {
            center: Coordinate::new(80.0, 153.5),
            radius_km: 500.0,
        };
        assert!(region.bounds().max_lng > 180.0);
        assert!(matches!(region.validate(), Err(AnalysisError::InvalidRegion(_))));

        let inland = Region::Circle {
            center: Coordinate::new(80.0, 100.0),
            radius_km: 500.0,
        };
        assert!(inland.validate().is_ok());
    }

    #[test]
    fn test_circle_over_pole_rejected() {
        let region = Region::Circle {
            center: Coordinate::new(89.0, 0.0),
            radius_km: 200.0,
        };
        assert!(region.validate().is_err());
    }
}
