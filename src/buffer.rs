//! Dilates restricted polygons by a metric safety margin.

use geo::Buffer;
use tracing::info;

use crate::error::{GapError, Result};
use crate::models::{BufferedZone, Layer, RestrictedPolygon};

pub const DEFAULT_BUFFER_METERS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestrictedZoneBuffer {
    distance: f64,
}

impl RestrictedZoneBuffer {
    /// Margin must be a positive, finite number of meters
    pub fn new(distance: f64) -> Result<Self> {
        if !distance.is_finite() || distance <= 0.0 {
            return Err(GapError::Config(format!(
                "buffer distance must be a positive number of meters, got {}",
                distance
            )));
        }
        Ok(Self { distance })
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Buffer every polygon of a projected layer, one zone per polygon
    pub fn buffer(&self, polygons: &Layer<RestrictedPolygon>) -> Result<Layer<BufferedZone>> {
        let crs = polygons.require_crs("restricted polygon")?;
        if crs.is_geographic() {
            return Err(GapError::ReferenceSystem(format!(
                "cannot buffer by {} m in geographic {}, normalize first",
                self.distance, crs
            )));
        }

        let zones: Vec<BufferedZone> = polygons
            .iter()
            .map(|polygon| BufferedZone {
                geometry: polygon.geometry.buffer(self.distance),
                tags: polygon.tags.clone(),
                distance: self.distance,
            })
            .collect();

        info!(
            "Buffered {} restricted polygons by {} m",
            zones.len(),
            self.distance
        );

        Ok(Layer::new(crs.clone(), zones))
    }
}

impl Default for RestrictedZoneBuffer {
    fn default() -> Self {
        Self {
            distance: DEFAULT_BUFFER_METERS,
        }
    }
}
