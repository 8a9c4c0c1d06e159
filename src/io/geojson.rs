//! GeoJSON readers for road and restriction layers, and the result writer.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use geo::{LineString, MultiLineString};
use geojson::{feature::Id, Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use tracing::{debug, info, warn};

use crate::error::{GapError, Result};
use crate::models::{
    Attributes, Layer, ReferenceSystem, RestrictedLine, RestrictedPolygon, RoadGeometry, Tags,
};

fn parse_collection(text: &str) -> Result<FeatureCollection> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(feature) => Ok(FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        }),
        GeoJson::Geometry(_) => Err(GapError::schema(
            "features",
            "expected a FeatureCollection, found a bare geometry",
        )),
    }
}

/// Reference system from the legacy `crs` member, WGS84 when absent (RFC 7946)
fn declared_crs(fc: &FeatureCollection) -> Result<ReferenceSystem> {
    let name = fc
        .foreign_members
        .as_ref()
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(|name| name.as_str());

    match name {
        Some(name) => ReferenceSystem::parse(name),
        None => Ok(ReferenceSystem::WGS84),
    }
}

fn to_geo(geometry: Geometry) -> Result<geo::Geometry<f64>> {
    Ok(geo::Geometry::<f64>::try_from(geometry)?)
}

fn tags_from(properties: Option<&JsonObject>) -> Tags {
    properties
        .map(|props| {
            props
                .iter()
                .filter_map(|(k, v)| match v {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some((k.clone(), s.clone())),
                    other => Some((k.clone(), other.to_string())),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn feature_id(feature: &Feature, id_property: &str) -> Option<String> {
    let from_property = || {
        feature
            .properties
            .as_ref()
            .and_then(|p| p.get(id_property))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    };

    match &feature.id {
        Some(Id::String(s)) => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => from_property(),
    }
}

/// Roads read from features, with rows that could not become roads set aside
#[derive(Debug)]
pub struct RoadFeatures {
    pub layer: Layer<RoadGeometry>,
    pub attempted: usize,
    /// (row label, error) per rejected feature
    pub failures: Vec<(String, GapError)>,
}

fn road_from_feature(row: usize, feature: Feature, id_property: &str) -> Result<RoadGeometry> {
    let road_id = feature_id(&feature, id_property);
    let label = road_id.clone().unwrap_or_else(|| format!("feature {}", row));

    let geometry = feature
        .geometry
        .ok_or_else(|| GapError::schema("geometry", format!("{} has no geometry", label)))?;

    let line: LineString<f64> = match to_geo(geometry)? {
        geo::Geometry::LineString(line) => line,
        geo::Geometry::MultiLineString(MultiLineString(mut parts)) if parts.len() == 1 => {
            parts.remove(0)
        }
        other => {
            return Err(GapError::schema(
                "LineString geometry",
                format!("{} is a {}", label, geometry_name(&other)),
            ))
        }
    };

    if line.0.len() < 2 {
        return Err(GapError::Degenerate {
            road_id: label,
            points: line.0.len(),
        });
    }

    Ok(RoadGeometry {
        road_id,
        row,
        line,
        attributes: feature.properties.unwrap_or_default(),
    })
}

fn geometry_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

/// Parse road LineString features.
///
/// The id comes from the feature id, then from `id_property`.
pub fn parse_roads(text: &str, id_property: &str) -> Result<RoadFeatures> {
    let fc = parse_collection(text)?;
    let crs = declared_crs(&fc)?;
    let attempted = fc.features.len();

    let mut roads = Vec::with_capacity(attempted);
    let mut failures = Vec::new();
    for (row, feature) in fc.features.into_iter().enumerate() {
        let label = feature_id(&feature, id_property).unwrap_or_else(|| format!("feature {}", row));
        match road_from_feature(row, feature, id_property) {
            Ok(road) => roads.push(road),
            Err(e) if e.is_row_scoped() => {
                debug!("Road {} rejected: {}", label, e);
                failures.push((label, e));
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "Loaded {} road features in {} ({} rejected)",
        roads.len(),
        crs,
        failures.len()
    );

    Ok(RoadFeatures {
        layer: Layer::new(crs, roads),
        attempted,
        failures,
    })
}

pub fn read_roads(path: &Path, id_property: &str) -> Result<RoadFeatures> {
    info!("Loading roads from {}", path.display());
    parse_roads(&fs::read_to_string(path)?, id_property)
}

/// Parse restricted-area polygons; other geometry types are skipped
pub fn parse_polygons(text: &str) -> Result<Layer<RestrictedPolygon>> {
    let fc = parse_collection(text)?;
    let crs = declared_crs(&fc)?;

    let mut polygons = Vec::new();
    let mut skipped = 0;
    for feature in fc.features {
        let tags = tags_from(feature.properties.as_ref());
        let Some(geometry) = feature.geometry else {
            skipped += 1;
            continue;
        };
        match to_geo(geometry)? {
            geo::Geometry::Polygon(p) => polygons.push(RestrictedPolygon::new(p, tags)),
            geo::Geometry::MultiPolygon(mp) => polygons.push(RestrictedPolygon::new(mp, tags)),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} restricted features without polygon geometry", skipped);
    }
    info!("Loaded {} restricted polygons in {}", polygons.len(), crs);

    Ok(Layer::new(crs, polygons))
}

pub fn read_polygons(path: &Path) -> Result<Layer<RestrictedPolygon>> {
    info!("Loading restricted polygons from {}", path.display());
    parse_polygons(&fs::read_to_string(path)?)
}

/// Parse restricted lines; other geometry types are skipped
pub fn parse_lines(text: &str) -> Result<Layer<RestrictedLine>> {
    let fc = parse_collection(text)?;
    let crs = declared_crs(&fc)?;

    let mut lines = Vec::new();
    let mut skipped = 0;
    for feature in fc.features {
        let tags = tags_from(feature.properties.as_ref());
        let Some(geometry) = feature.geometry else {
            skipped += 1;
            continue;
        };
        match to_geo(geometry)? {
            geo::Geometry::LineString(l) => lines.push(RestrictedLine::new(l, tags)),
            geo::Geometry::MultiLineString(ml) => lines.push(RestrictedLine::new(ml, tags)),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} restricted features without line geometry", skipped);
    }
    info!("Loaded {} restricted lines in {}", lines.len(), crs);

    Ok(Layer::new(crs, lines))
}

pub fn read_lines(path: &Path) -> Result<Layer<RestrictedLine>> {
    info!("Loading restricted lines from {}", path.display());
    parse_lines(&fs::read_to_string(path)?)
}

/// Selected roads with original attributes plus centroid `lat`/`lon`
pub fn to_feature_collection(roads: &Layer<RoadGeometry>) -> Result<FeatureCollection> {
    let crs = roads.require_crs("selected road")?;
    if !crs.is_geographic() {
        return Err(GapError::ReferenceSystem(format!(
            "output must be geographic, selected roads are in {}",
            crs
        )));
    }

    let features = roads
        .iter()
        .map(|road| {
            let mut properties: Attributes = road.attributes.clone();
            if let Some(id) = &road.road_id {
                properties
                    .entry("road_id")
                    .or_insert_with(|| id.clone().into());
            }
            if let Some((lon, lat)) = road.centroid() {
                properties.insert("lon".to_string(), lon.into());
                properties.insert("lat".to_string(), lat.into());
            }

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::from(&road.line))),
                id: road.road_id.clone().map(Id::String),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

pub fn write_selected(path: &Path, roads: &Layer<RoadGeometry>) -> Result<()> {
    let geojson = GeoJson::FeatureCollection(to_feature_collection(roads)?);

    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), &geojson)?;

    info!("Wrote {} roads to {}", roads.len(), path.display());
    Ok(())
}
