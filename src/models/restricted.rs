//! Restricted-area geometries and their OSM tags.

use std::collections::BTreeMap;

use geo::{MultiLineString, MultiPolygon};
use serde::{Deserialize, Serialize};

/// OSM-style key/value tags describing a restriction
pub type Tags = BTreeMap<String, String>;

/// Broad restriction category derived from OSM tags.
/// See: https://wiki.openstreetmap.org/wiki/Map_features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionCategory {
    /// landuse=military|industrial|commercial|cemetery|landfill
    Landuse,
    /// leisure=nature_reserve|golf_course
    Leisure,
    /// boundary=protected_area
    Boundary,
    /// aeroway=aerodrome
    Aeroway,
    /// building=school|hospital|warehouse|government|military
    Building,
    /// amenity=school|university|police|hospital
    Amenity,
    /// barrier=fence|gate|wall
    Barrier,
    /// access=private|permit|military, motorcycle=no
    Access,
    /// highway=service|track, service=driveway|emergency_access
    Highway,
    /// Anything not recognised above
    Other,
}

impl RestrictionCategory {
    /// Classify a tag set, checking the most specific keys first
    pub fn from_tags(tags: &Tags) -> Self {
        let has = |key: &str| tags.get(key).is_some_and(|v| !v.is_empty() && v != "no");

        if has("aeroway") {
            RestrictionCategory::Aeroway
        } else if has("boundary") {
            RestrictionCategory::Boundary
        } else if has("landuse") {
            RestrictionCategory::Landuse
        } else if has("leisure") {
            RestrictionCategory::Leisure
        } else if has("amenity") {
            RestrictionCategory::Amenity
        } else if has("building") {
            RestrictionCategory::Building
        } else if has("barrier") {
            RestrictionCategory::Barrier
        } else if has("highway") || has("service") {
            RestrictionCategory::Highway
        } else if has("access") || tags.contains_key("motorcycle") {
            RestrictionCategory::Access
        } else {
            RestrictionCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RestrictionCategory::Landuse => "landuse",
            RestrictionCategory::Leisure => "leisure",
            RestrictionCategory::Boundary => "boundary",
            RestrictionCategory::Aeroway => "aeroway",
            RestrictionCategory::Building => "building",
            RestrictionCategory::Amenity => "amenity",
            RestrictionCategory::Barrier => "barrier",
            RestrictionCategory::Access => "access",
            RestrictionCategory::Highway => "highway",
            RestrictionCategory::Other => "other",
        }
    }
}

/// Areal restriction (military zone, airport, hospital grounds, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictedPolygon {
    pub geometry: MultiPolygon<f64>,
    pub tags: Tags,
}

impl RestrictedPolygon {
    pub fn new(geometry: impl Into<MultiPolygon<f64>>, tags: Tags) -> Self {
        Self {
            geometry: geometry.into(),
            tags,
        }
    }

    pub fn category(&self) -> RestrictionCategory {
        RestrictionCategory::from_tags(&self.tags)
    }
}

/// Linear restriction (private service road, fence, wall, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictedLine {
    pub geometry: MultiLineString<f64>,
    pub tags: Tags,
}

impl RestrictedLine {
    pub fn new(geometry: impl Into<MultiLineString<f64>>, tags: Tags) -> Self {
        Self {
            geometry: geometry.into(),
            tags,
        }
    }

    pub fn category(&self) -> RestrictionCategory {
        RestrictionCategory::from_tags(&self.tags)
    }
}

/// A restricted polygon dilated by a safety margin
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedZone {
    pub geometry: MultiPolygon<f64>,
    pub tags: Tags,
    /// Margin in reference-system units (meters once projected)
    pub distance: f64,
}

impl BufferedZone {
    /// Use a polygon as a zone without any margin
    pub fn unbuffered(polygon: &RestrictedPolygon) -> Self {
        Self {
            geometry: polygon.geometry.clone(),
            tags: polygon.tags.clone(),
            distance: 0.0,
        }
    }

    pub fn category(&self) -> RestrictionCategory {
        RestrictionCategory::from_tags(&self.tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_category_from_tags() {
        assert_eq!(
            RestrictionCategory::from_tags(&tags(&[("landuse", "military")])),
            RestrictionCategory::Landuse
        );
        assert_eq!(
            RestrictionCategory::from_tags(&tags(&[("aeroway", "aerodrome"), ("landuse", "x")])),
            RestrictionCategory::Aeroway
        );
        assert_eq!(
            RestrictionCategory::from_tags(&tags(&[("highway", "service"), ("access", "private")])),
            RestrictionCategory::Highway
        );
        assert_eq!(
            RestrictionCategory::from_tags(&tags(&[("motorcycle", "no")])),
            RestrictionCategory::Access
        );
        assert_eq!(
            RestrictionCategory::from_tags(&Tags::new()),
            RestrictionCategory::Other
        );
    }
}
