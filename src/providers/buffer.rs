//! Buffer factor from distance to known conflict zones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{BufferProvider, ProviderError};
use crate::normalize::clamp_unit;
use crate::sample::BufferSample;
use crate::spatial::Coordinate;

/// A circular area planting should keep clear of (settlements, roads, contested land).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictZone {
    #[serde(default)]
    pub name: Option<String>,
    pub center: Coordinate,
    #[serde(default)]
    pub radius_km: f64,
}

/// Clearance grows linearly from 0 at a zone's edge to 1 at `safe_distance_km` beyond it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictZoneBuffer {
    zones: Vec<ConflictZone>,
    safe_distance_km: f64,
}

impl ConflictZoneBuffer {
    pub fn new(zones: Vec<ConflictZone>, safe_distance_km: f64) -> Self {
        Self {
            zones,
            safe_distance_km,
        }
    }

    /// Kilometres from `at` to the edge of the nearest zone; 0 inside a zone.
    pub fn distance_to_nearest(&self, at: &Coordinate) -> Option<f64> {
        self.zones
            .iter()
            .map(|zone| (zone.center.haversine_km(at) - zone.radius_km.max(0.0)).max(0.0))
            .reduce(f64::min)
    }

    pub fn clearance(&self, at: &Coordinate) -> f64 {
        match self.distance_to_nearest(at) {
            None => 1.0,
            Some(distance) if self.safe_distance_km <= 0.0 => {
                if distance > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Some(distance) => clamp_unit(distance / self.safe_distance_km),
        }
    }
}

#[async_trait]
impl BufferProvider for ConflictZoneBuffer {
    fn name(&self) -> &str {
        "conflict_zones"
    }

    async fn buffer(&self, at: Coordinate) -> Result<BufferSample, ProviderError> {
        Ok(BufferSample {
            clearance: self.clearance(&at),
        })
    }
}
