//! Reference-system normalization.
//!
//! Metric buffering needs every participating layer in one projected system.
//! When roads arrive in degrees, a UTM zone is chosen from the centre of the
//! data and all layers are reprojected into it with proj4rs.

use geo::{BoundingRect, Coord, MapCoords, Rect};
use proj4rs::{proj::Proj, transform::transform};
use tracing::{debug, info};

use crate::error::{GapError, Result};
use crate::models::{
    BufferedZone, Layer, ReferenceSystem, RestrictedLine, RestrictedPolygon, RoadGeometry,
};

/// A prepared transformation between two reference systems
pub struct Transformer {
    from: Proj,
    to: Proj,
    from_geographic: bool,
    to_geographic: bool,
}

impl Transformer {
    pub fn new(from: &ReferenceSystem, to: &ReferenceSystem) -> Result<Self> {
        let build = |crs: &ReferenceSystem| -> Result<Proj> {
            let def = crs.proj4()?;
            Proj::from_proj_string(&def).map_err(|e| {
                GapError::ReferenceSystem(format!("failed to build PROJ.4 '{}': {}", def, e))
            })
        };

        Ok(Self {
            from: build(from)?,
            to: build(to)?,
            from_geographic: from.is_geographic(),
            to_geographic: to.is_geographic(),
        })
    }

    /// Degrees in and out for geographic systems, native units otherwise
    pub fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = if self.from_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };

        transform(&self.from, &self.to, &mut point).map_err(|e| {
            GapError::Projection(format!("({}, {}): {}", coord.x, coord.y, e))
        })?;

        let out = if self.to_geographic {
            Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            }
        } else {
            Coord {
                x: point.0,
                y: point.1,
            }
        };

        if !(out.x.is_finite() && out.y.is_finite()) {
            return Err(GapError::Projection(format!(
                "({}, {}) has no finite image",
                coord.x, coord.y
            )));
        }
        Ok(out)
    }
}

/// Features whose geometry can be moved between reference systems
pub trait Reproject: Sized {
    fn reproject(&self, transformer: &Transformer) -> Result<Self>;

    fn bounds(&self) -> Option<Rect<f64>>;
}

impl Reproject for RoadGeometry {
    fn reproject(&self, transformer: &Transformer) -> Result<Self> {
        Ok(Self {
            line: self.line.try_map_coords(|c| transformer.transform(c))?,
            road_id: self.road_id.clone(),
            row: self.row,
            attributes: self.attributes.clone(),
        })
    }

    fn bounds(&self) -> Option<Rect<f64>> {
        self.line.bounding_rect()
    }
}

impl Reproject for RestrictedPolygon {
    fn reproject(&self, transformer: &Transformer) -> Result<Self> {
        Ok(Self {
            geometry: self.geometry.try_map_coords(|c| transformer.transform(c))?,
            tags: self.tags.clone(),
        })
    }

    fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

impl Reproject for RestrictedLine {
    fn reproject(&self, transformer: &Transformer) -> Result<Self> {
        Ok(Self {
            geometry: self.geometry.try_map_coords(|c| transformer.transform(c))?,
            tags: self.tags.clone(),
        })
    }

    fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

impl Reproject for BufferedZone {
    fn reproject(&self, transformer: &Transformer) -> Result<Self> {
        Ok(Self {
            geometry: self.geometry.try_map_coords(|c| transformer.transform(c))?,
            tags: self.tags.clone(),
            distance: self.distance,
        })
    }

    fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// Combined extent of a layer
pub fn layer_bounds<T: Reproject>(layer: &Layer<T>) -> Option<Rect<f64>> {
    layer
        .iter()
        .filter_map(Reproject::bounds)
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

/// Reproject a whole layer; a layer already in `to` is cloned as is
pub fn reproject_layer<T: Reproject + Clone>(
    layer: &Layer<T>,
    name: &str,
    to: &ReferenceSystem,
) -> Result<Layer<T>> {
    let from = layer.require_crs(name)?;
    if from == to {
        return Ok(layer.clone());
    }

    debug!("Reprojecting {} {} features {} -> {}", layer.len(), name, from, to);
    let transformer = Transformer::new(from, to)?;
    let features = layer
        .iter()
        .map(|f| f.reproject(&transformer))
        .collect::<Result<Vec<_>>>()?;

    Ok(Layer::new(to.clone(), features))
}

/// Road and restriction layers expressed in one shared reference system
#[derive(Debug, Clone)]
pub struct NormalizedInputs {
    pub crs: ReferenceSystem,
    pub roads: Layer<RoadGeometry>,
    pub polygons: Layer<RestrictedPolygon>,
    pub lines: Option<Layer<RestrictedLine>>,
}

pub struct CrsNormalizer;

impl CrsNormalizer {
    /// UTM zone whose central meridian is closest to the centre of `extent`.
    /// - WGS84: 326zz (north) / 327zz (south)
    /// - NAD83: 269zz (north only; south falls back to WGS84 UTM-S)
    pub fn estimate_utm(extent: Option<Rect<f64>>, source: &ReferenceSystem) -> ReferenceSystem {
        let center = extent.map(|r| r.center()).unwrap_or(Coord { x: 0.0, y: 0.0 });
        let zone = (((center.x + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u32;
        ReferenceSystem::utm(zone, center.y < 0.0, source.is_nad83())
    }

    /// Bring roads and restriction layers into one reference system.
    ///
    /// Geographic roads select a local UTM zone for everything; projected roads
    /// keep their system and the other layers follow them. Inputs are never
    /// modified.
    pub fn normalize(
        roads: &Layer<RoadGeometry>,
        polygons: &Layer<RestrictedPolygon>,
        lines: Option<&Layer<RestrictedLine>>,
    ) -> Result<NormalizedInputs> {
        let road_crs = roads.require_crs("road")?;
        polygons.require_crs("restricted polygon")?;
        if let Some(lines) = lines {
            lines.require_crs("restricted line")?;
        }

        let target = if road_crs.is_geographic() {
            let extent = layer_bounds(roads)
                .or_else(|| layer_bounds(polygons))
                .or_else(|| lines.and_then(layer_bounds));
            let utm = Self::estimate_utm(extent, road_crs);
            info!("Roads are geographic ({}), projecting to {}", road_crs, utm);
            utm
        } else {
            debug!("Roads already projected in {}", road_crs);
            road_crs.clone()
        };

        Ok(NormalizedInputs {
            roads: reproject_layer(roads, "road", &target)?,
            polygons: reproject_layer(polygons, "restricted polygon", &target)?,
            lines: lines
                .map(|l| reproject_layer(l, "restricted line", &target))
                .transpose()?,
            crs: target,
        })
    }

    /// Express a layer in WGS84 degrees
    pub fn to_geographic<T: Reproject + Clone>(layer: &Layer<T>, name: &str) -> Result<Layer<T>> {
        reproject_layer(layer, name, &ReferenceSystem::WGS84)
    }
}
