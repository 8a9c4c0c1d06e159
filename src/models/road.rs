//! Road rows, flattened points and reconstructed road lines.

use geo::{Centroid, LineString};
use serde::Serialize;

use super::RestrictionCategory;

/// Original row/feature attributes, carried through to the output untouched
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// One raw input row: a road id plus its string-encoded coordinate cell
#[derive(Debug, Clone, PartialEq)]
pub struct RoadRow {
    /// Zero-based position in the source file
    pub row: usize,
    pub road_id: String,
    /// Nested coordinate list as text, e.g. `[[(104.75, -2.97), (104.76, -2.96)]]`
    pub coordinates: String,
    pub attributes: Attributes,
}

impl RoadRow {
    pub fn new(row: usize, road_id: impl Into<String>, coordinates: impl Into<String>) -> Self {
        Self {
            row,
            road_id: road_id.into(),
            coordinates: coordinates.into(),
            attributes: Attributes::new(),
        }
    }
}

/// A single coordinate pair of a road, tagged with its position along the road
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointRecord<'a> {
    pub road_id: &'a str,
    pub sequence_index: usize,
    pub x: f64,
    pub y: f64,
}

/// A road reconstructed as an ordered line
#[derive(Debug, Clone, PartialEq)]
pub struct RoadGeometry {
    /// Absent only for feature inputs that carry no identifier
    pub road_id: Option<String>,
    /// Source position of the first row contributing to this road
    pub row: usize,
    pub line: LineString<f64>,
    pub attributes: Attributes,
}

impl RoadGeometry {
    pub fn new(road_id: impl Into<String>, row: usize, line: LineString<f64>) -> Self {
        Self {
            road_id: Some(road_id.into()),
            row,
            line,
            attributes: Attributes::new(),
        }
    }

    /// Identifier used in logs and reports
    pub fn label(&self) -> String {
        match &self.road_id {
            Some(id) => id.clone(),
            None => format!("row {}", self.row),
        }
    }

    /// Identity used when collapsing duplicate join rows.
    ///
    /// The road id when present, otherwise the full attribute tuple plus geometry.
    pub fn dedup_key(&self) -> String {
        match &self.road_id {
            Some(id) => format!("id:{}", id),
            None => {
                let coords: Vec<[f64; 2]> = self.line.coords().map(|c| [c.x, c.y]).collect();
                format!(
                    "attrs:{}|{}",
                    serde_json::Value::Object(self.attributes.clone()),
                    serde_json::json!(coords)
                )
            }
        }
    }

    /// Centroid as (lon, lat) when the road is in geographic coordinates
    pub fn centroid(&self) -> Option<(f64, f64)> {
        self.line.centroid().map(|p| (p.x(), p.y()))
    }
}

/// Outcome of testing one road against the restriction surface
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub road: RoadGeometry,
    pub matched: bool,
    /// Number of restriction surface members the road intersects
    pub hits: usize,
    /// Distinct categories of the members hit, in category order
    pub categories: Vec<RestrictionCategory>,
}

impl MatchResult {
    pub fn road_id(&self) -> Option<&str> {
        self.road.road_id.as_deref()
    }
}
