//! Selects roads that touch the restriction surface.
//!
//! The surface is the set of buffered polygons plus the raw restricted lines.
//! Each road is tested against it through an R-tree, join rows are collapsed
//! so every road appears once, and the result is returned in WGS84.

mod index;

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::crs::{Reproject, Transformer};
use crate::error::{GapError, Result};
use crate::models::{
    BufferedZone, Layer, MatchResult, ReferenceSystem, RestrictedLine, RestrictionCategory,
    RoadGeometry,
};

pub use index::{RestrictionIndex, RestrictionMember, RestrictionShape};

/// Matching result for a whole road layer
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Reference system the intersection tests ran in
    pub processing_crs: ReferenceSystem,
    /// One entry per distinct road, in source order, geometry in WGS84
    pub results: Vec<MatchResult>,
}

impl MatchOutcome {
    pub fn selected(&self) -> impl Iterator<Item = &MatchResult> {
        self.results.iter().filter(|r| r.matched)
    }

    pub fn selected_count(&self) -> usize {
        self.selected().count()
    }

    /// Selected roads as a WGS84 layer
    pub fn selected_layer(&self) -> Layer<RoadGeometry> {
        Layer::new(
            ReferenceSystem::WGS84,
            self.selected().map(|r| r.road.clone()).collect(),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpatialMatcher {
    parallel: bool,
}

impl SpatialMatcher {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    /// Combine buffered zones and raw lines into one indexed surface.
    ///
    /// Lines are not buffered; a road must cross them directly.
    pub fn surface(
        zones: &Layer<BufferedZone>,
        lines: Option<&Layer<RestrictedLine>>,
    ) -> RestrictionIndex {
        let mut members: Vec<RestrictionMember> = zones
            .iter()
            .map(|zone| RestrictionMember {
                shape: RestrictionShape::Zone(zone.geometry.clone()),
                category: zone.category(),
            })
            .collect();

        if let Some(lines) = lines {
            members.extend(lines.iter().map(|line| RestrictionMember {
                shape: RestrictionShape::Line(line.geometry.clone()),
                category: line.category(),
            }));
        }

        let mut by_category: BTreeMap<RestrictionCategory, usize> = BTreeMap::new();
        for member in &members {
            *by_category.entry(member.category).or_default() += 1;
        }
        for (category, count) in &by_category {
            debug!("  {}: {} members", category.as_str(), count);
        }

        RestrictionIndex::build(members)
    }

    /// Every layer must already share one declared reference system
    fn shared_crs(
        roads: &Layer<RoadGeometry>,
        zones: &Layer<BufferedZone>,
        lines: Option<&Layer<RestrictedLine>>,
    ) -> Result<ReferenceSystem> {
        let crs = roads.require_crs("road")?;
        let mut others = vec![("buffered zone", zones.require_crs("buffered zone")?)];
        if let Some(lines) = lines {
            others.push(("restricted line", lines.require_crs("restricted line")?));
        }

        for (name, other) in others {
            if other != crs {
                return Err(GapError::ReferenceSystem(format!(
                    "{} layer is in {} but roads are in {}, normalize inputs first",
                    name, other, crs
                )));
            }
        }
        Ok(crs.clone())
    }

    pub fn match_roads(
        &self,
        roads: &Layer<RoadGeometry>,
        zones: &Layer<BufferedZone>,
        lines: Option<&Layer<RestrictedLine>>,
    ) -> Result<MatchOutcome> {
        let processing_crs = Self::shared_crs(roads, zones, lines)?;

        if let Some(road) = roads.iter().find(|r| r.line.0.is_empty()) {
            return Err(GapError::schema(
                "geometry",
                format!("road {} has no geometry", road.label()),
            ));
        }

        let surface = Self::surface(zones, lines);

        info!(
            "Testing {} roads against {} restriction members{}",
            roads.len(),
            surface.len(),
            if self.parallel { " (parallel)" } else { "" }
        );

        // Ordered collect keeps the source order regardless of scheduling
        let hits: Vec<Vec<usize>> = if self.parallel {
            roads
                .features
                .par_iter()
                .map(|road| surface.hits(&road.line))
                .collect()
        } else {
            roads.iter().map(|road| surface.hits(&road.line)).collect()
        };

        let join_rows = hits.iter().map(Vec::len).sum::<usize>();
        let results = Self::collapse(roads, &hits, &surface);
        let selected = results.iter().filter(|r| r.matched).count();
        info!(
            "{} join rows collapsed to {} intersecting roads",
            join_rows, selected
        );

        let results = Self::to_geographic(results, &processing_crs)?;

        Ok(MatchOutcome {
            processing_crs,
            results,
        })
    }

    /// Inner-join rows collapsed to one result per distinct road.
    ///
    /// A road key appears once; the first road instance with at least one hit
    /// is kept, otherwise the first instance is reported as unmatched.
    fn collapse(
        roads: &Layer<RoadGeometry>,
        hits: &[Vec<usize>],
        surface: &RestrictionIndex,
    ) -> Vec<MatchResult> {
        let keys: Vec<String> = roads.iter().map(RoadGeometry::dedup_key).collect();

        let mut chosen: HashMap<&str, usize> = HashMap::new();
        for (idx, key) in keys.iter().enumerate() {
            let matched = !hits[idx].is_empty();
            let existing = chosen.get(key.as_str()).copied();
            match existing {
                Some(prev) if matched && hits[prev].is_empty() => {
                    chosen.insert(key.as_str(), idx);
                }
                Some(_) => {
                    debug!("Dropping duplicate join row for {}", roads.features[idx].label());
                }
                None => {
                    chosen.insert(key.as_str(), idx);
                }
            }
        }

        let mut emitted: HashSet<&str> = HashSet::new();
        let mut order: Vec<usize> = Vec::with_capacity(chosen.len());
        for key in &keys {
            if emitted.insert(key.as_str()) {
                order.push(chosen[key.as_str()]);
            }
        }

        order
            .into_iter()
            .map(|idx| {
                let mut categories: Vec<RestrictionCategory> = hits[idx]
                    .iter()
                    .filter_map(|&m| surface.member(m).map(|member| member.category))
                    .collect();
                categories.sort();
                categories.dedup();

                MatchResult {
                    road: roads.features[idx].clone(),
                    matched: !hits[idx].is_empty(),
                    hits: hits[idx].len(),
                    categories,
                }
            })
            .collect()
    }

    fn to_geographic(
        results: Vec<MatchResult>,
        from: &ReferenceSystem,
    ) -> Result<Vec<MatchResult>> {
        if *from == ReferenceSystem::WGS84 {
            return Ok(results);
        }

        debug!("Reprojecting {} results {} -> {}", results.len(), from, ReferenceSystem::WGS84);
        let transformer = Transformer::new(from, &ReferenceSystem::WGS84)?;
        results
            .into_iter()
            .map(|mut result| {
                result.road = result.road.reproject(&transformer)?;
                Ok(result)
            })
            .collect()
    }
}

impl Default for SpatialMatcher {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RestrictedZoneBuffer;
    use crate::models::{RestrictedPolygon, Tags};
    use geo::{polygon, LineString};

    // Planar, meter-based and well behaved around the origin
    const PLANAR: ReferenceSystem = ReferenceSystem::Epsg(3857);

    fn square(min: f64, max: f64) -> RestrictedPolygon {
        RestrictedPolygon::new(
            polygon![(x: min, y: min), (x: max, y: min), (x: max, y: max), (x: min, y: max)],
            Tags::new(),
        )
    }

    fn vertical_road() -> Layer<RoadGeometry> {
        Layer::new(
            PLANAR,
            vec![RoadGeometry::new(
                "R1",
                0,
                LineString::from(vec![(0.0, 0.0), (0.0, 10.0)]),
            )],
        )
    }

    fn selected_ids(outcome: &MatchOutcome) -> Vec<String> {
        outcome
            .selected()
            .filter_map(|r| r.road_id().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_touching_zone_without_margin_selects_road() {
        let polygons = Layer::new(PLANAR, vec![square(-1.0, 1.0)]);
        let zones = Layer::new(PLANAR, polygons.iter().map(BufferedZone::unbuffered).collect());

        let outcome = SpatialMatcher::new(false)
            .match_roads(&vertical_road(), &zones, None)
            .unwrap();
        assert_eq!(selected_ids(&outcome), vec!["R1"]);
    }

    #[test]
    fn test_margin_keeps_selection_and_far_zone_does_not_match() {
        let near = Layer::new(PLANAR, vec![square(-1.0, 1.0)]);
        let zones = RestrictedZoneBuffer::new(5.0).unwrap().buffer(&near).unwrap();
        let outcome = SpatialMatcher::default()
            .match_roads(&vertical_road(), &zones, None)
            .unwrap();
        assert_eq!(selected_ids(&outcome), vec!["R1"]);

        let far = Layer::new(PLANAR, vec![square(100.0, 101.0)]);
        let zones = RestrictedZoneBuffer::new(5.0).unwrap().buffer(&far).unwrap();
        let outcome = SpatialMatcher::default()
            .match_roads(&vertical_road(), &zones, None)
            .unwrap();
        assert_eq!(outcome.selected_count(), 0);
        assert_eq!(outcome.results.len(), 1);
        assert!(!outcome.results[0].matched);
    }

    #[test]
    fn test_lines_are_matched_without_buffer() {
        let zones: Layer<BufferedZone> = Layer::new(PLANAR, vec![]);
        let mut tags = Tags::new();
        tags.insert("barrier".into(), "fence".into());
        let fence = RestrictedLine::new(LineString::from(vec![(-5.0, 5.0), (5.0, 5.0)]), tags);
        let near_miss = RestrictedLine::new(
            LineString::from(vec![(0.5, -5.0), (0.5, 20.0)]),
            Tags::new(),
        );

        let lines = Layer::new(PLANAR, vec![fence]);
        let outcome = SpatialMatcher::default()
            .match_roads(&vertical_road(), &zones, Some(&lines))
            .unwrap();
        assert_eq!(selected_ids(&outcome), vec!["R1"]);
        assert_eq!(outcome.results[0].categories, vec![RestrictionCategory::Barrier]);

        let lines = Layer::new(PLANAR, vec![near_miss]);
        let outcome = SpatialMatcher::default()
            .match_roads(&vertical_road(), &zones, Some(&lines))
            .unwrap();
        assert_eq!(outcome.selected_count(), 0);
    }

    #[test]
    fn test_multiple_hits_collapse_to_one_row() {
        let polygons = Layer::new(
            PLANAR,
            vec![square(-1.0, 1.0), square(0.5, 4.0), square(-3.0, -0.5)],
        );
        let zones = RestrictedZoneBuffer::new(1.0).unwrap().buffer(&polygons).unwrap();
        let lines = Layer::new(
            PLANAR,
            vec![RestrictedLine::new(
                LineString::from(vec![(-5.0, 8.0), (5.0, 8.0)]),
                Tags::new(),
            )],
        );

        let matcher = SpatialMatcher::default();
        let first = matcher
            .match_roads(&vertical_road(), &zones, Some(&lines))
            .unwrap();
        assert_eq!(first.results.len(), 1);
        assert_eq!(first.results[0].hits, 4);

        let second = matcher
            .match_roads(&vertical_road(), &zones, Some(&lines))
            .unwrap();
        assert_eq!(selected_ids(&first), selected_ids(&second));
    }

    #[test]
    fn test_duplicate_road_ids_appear_once() {
        let roads = Layer::new(
            PLANAR,
            vec![
                RoadGeometry::new("A", 0, LineString::from(vec![(50.0, 50.0), (60.0, 60.0)])),
                RoadGeometry::new("B", 1, LineString::from(vec![(0.0, 0.0), (0.0, 10.0)])),
                RoadGeometry::new("A", 2, LineString::from(vec![(0.0, -5.0), (0.0, 5.0)])),
            ],
        );
        let zones = Layer::new(PLANAR, vec![BufferedZone::unbuffered(&square(-1.0, 1.0))]);

        let outcome = SpatialMatcher::new(false).match_roads(&roads, &zones, None).unwrap();
        let ids: Vec<_> = outcome.results.iter().map(|r| r.road_id().unwrap()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        // The matching instance of A wins over the earlier unmatched one
        assert!(outcome.results[0].matched);
        assert_eq!(outcome.results[0].road.row, 2);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let roads = Layer::new(
            PLANAR,
            (0..200)
                .map(|i| {
                    let x = i as f64 * 0.5 - 50.0;
                    RoadGeometry::new(
                        format!("R{}", i),
                        i,
                        LineString::from(vec![(x, -10.0), (x, 10.0)]),
                    )
                })
                .collect(),
        );
        let polygons = Layer::new(PLANAR, vec![square(-10.0, -5.0), square(20.0, 30.0)]);
        let zones = RestrictedZoneBuffer::new(2.0).unwrap().buffer(&polygons).unwrap();

        let seq = SpatialMatcher::new(false).match_roads(&roads, &zones, None).unwrap();
        let par = SpatialMatcher::new(true).match_roads(&roads, &zones, None).unwrap();
        assert_eq!(selected_ids(&seq), selected_ids(&par));
        assert!(seq.selected_count() > 0);
    }

    #[test]
    fn test_reference_system_mismatch_fails() {
        let zones = Layer::new(
            ReferenceSystem::Epsg(32633),
            vec![BufferedZone::unbuffered(&square(-1.0, 1.0))],
        );
        assert!(matches!(
            SpatialMatcher::default().match_roads(&vertical_road(), &zones, None),
            Err(GapError::ReferenceSystem(_))
        ));
    }

    #[test]
    fn test_missing_geometry_is_schema_error() {
        let roads = Layer::new(PLANAR, vec![RoadGeometry::new("R1", 0, LineString::new(vec![]))]);
        let zones: Layer<BufferedZone> = Layer::new(PLANAR, vec![]);
        assert!(matches!(
            SpatialMatcher::default().match_roads(&roads, &zones, None),
            Err(GapError::Schema { .. })
        ));
    }

    #[test]
    fn test_results_are_geographic() {
        let utm = ReferenceSystem::Epsg(32748);
        let airport = RestrictedPolygon::new(
            polygon![
                (x: 499_990.0, y: 9_668_400.0),
                (x: 500_010.0, y: 9_668_400.0),
                (x: 500_010.0, y: 9_668_600.0),
                (x: 499_990.0, y: 9_668_600.0),
            ],
            Tags::new(),
        );
        let polygons = Layer::new(utm.clone(), vec![airport]);
        let zones = RestrictedZoneBuffer::new(10.0).unwrap().buffer(&polygons).unwrap();
        let roads = Layer::new(
            utm.clone(),
            vec![RoadGeometry::new(
                "R1",
                0,
                LineString::from(vec![(500_000.0, 9_668_000.0), (500_000.0, 9_669_000.0)]),
            )],
        );

        let outcome = SpatialMatcher::default().match_roads(&roads, &zones, None).unwrap();
        assert_eq!(outcome.processing_crs, utm);
        assert!(outcome.results[0].matched);
        for coord in outcome.results[0].road.line.coords() {
            assert!((coord.x - 105.0).abs() < 1e-6, "lon {}", coord.x);
            assert!(coord.y < -2.9 && coord.y > -3.1, "lat {}", coord.y);
        }
    }
}
