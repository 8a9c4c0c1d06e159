//! Groups flattened points into one ordered line per road.

use geo::{Coord, LineString};
use hashbrown::HashMap;
use tracing::{debug, info};

use crate::error::{GapError, Result};
use crate::flatten::FlatRow;
use crate::models::{Attributes, PointRecord, RoadGeometry};

/// Result of building one road
#[derive(Debug, Clone, PartialEq)]
pub enum Polyline {
    Line(RoadGeometry),
    /// Fewer than two points; reported, never dropped
    Degenerate {
        road_id: String,
        row: usize,
        points: Vec<Coord<f64>>,
    },
}

impl Polyline {
    pub fn road_id(&self) -> Option<&str> {
        match self {
            Polyline::Line(road) => road.road_id.as_deref(),
            Polyline::Degenerate { road_id, .. } => Some(road_id),
        }
    }

    pub fn into_result(self) -> Result<RoadGeometry> {
        match self {
            Polyline::Line(road) => Ok(road),
            Polyline::Degenerate {
                road_id, points, ..
            } => Err(GapError::Degenerate {
                road_id,
                points: points.len(),
            }),
        }
    }
}

struct Group<'a> {
    road_id: &'a str,
    row: usize,
    attributes: Option<&'a Attributes>,
    points: Vec<(usize, Coord<f64>)>,
}

/// Collects points per road id, keeping roads in first-seen order
pub struct PolylineBuilder<'a> {
    groups: Vec<Group<'a>>,
    by_id: HashMap<&'a str, usize>,
}

impl<'a> PolylineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Build directly from a point stream; rows are numbered by first appearance
    pub fn from_points<I>(points: I) -> Vec<Polyline>
    where
        I: IntoIterator<Item = PointRecord<'a>>,
    {
        let mut builder = Self::new();
        for point in points {
            builder.push(point);
        }
        builder.finish()
    }

    fn group_mut(&mut self, road_id: &'a str, row: usize) -> &mut Group<'a> {
        let next = self.groups.len();
        let idx = *self.by_id.entry(road_id).or_insert(next);
        if idx == next {
            self.groups.push(Group {
                road_id,
                row,
                attributes: None,
                points: Vec::new(),
            });
        }
        &mut self.groups[idx]
    }

    pub fn push(&mut self, point: PointRecord<'a>) {
        let row = self.groups.len();
        let group = self.group_mut(point.road_id, row);
        group.points.push((
            point.sequence_index,
            Coord {
                x: point.x,
                y: point.y,
            },
        ));
    }

    /// Add every point of a flattened row.
    ///
    /// The first row seen for a road supplies its attributes and source row.
    pub fn add_row(&mut self, flat: &FlatRow<'a>) {
        let source = flat.source;
        let group = self.group_mut(&source.road_id, source.row);
        if group.attributes.is_none() {
            group.attributes = Some(&source.attributes);
            group.row = source.row;
        }
        group.points.extend(
            flat.points()
                .map(|p| (p.sequence_index, Coord { x: p.x, y: p.y })),
        );
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Emit one result per road, points sorted by sequence index
    pub fn finish(self) -> Vec<Polyline> {
        let mut degenerate = 0;

        let polylines: Vec<Polyline> = self
            .groups
            .into_iter()
            .map(|mut group| {
                // Stable: equal indices keep arrival order
                group.points.sort_by_key(|(seq, _)| *seq);
                let coords: Vec<Coord<f64>> = group.points.into_iter().map(|(_, c)| c).collect();

                if coords.len() < 2 {
                    degenerate += 1;
                    debug!(
                        "Road {} has {} point(s), flagged degenerate",
                        group.road_id,
                        coords.len()
                    );
                    return Polyline::Degenerate {
                        road_id: group.road_id.to_string(),
                        row: group.row,
                        points: coords,
                    };
                }

                Polyline::Line(RoadGeometry {
                    road_id: Some(group.road_id.to_string()),
                    row: group.row,
                    line: LineString::new(coords),
                    attributes: group.attributes.cloned().unwrap_or_default(),
                })
            })
            .collect();

        info!(
            "Built {} road lines ({} degenerate)",
            polylines.len() - degenerate,
            degenerate
        );

        polylines
    }
}

impl Default for PolylineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::CoordinateFlattener;
    use crate::models::RoadRow;

    fn point(road_id: &str, sequence_index: usize, x: f64, y: f64) -> PointRecord<'_> {
        PointRecord {
            road_id,
            sequence_index,
            x,
            y,
        }
    }

    fn build_rows(rows: &[RoadRow]) -> Vec<Polyline> {
        let mut builder = PolylineBuilder::new();
        for flat in CoordinateFlattener::flatten(rows) {
            builder.add_row(&flat.unwrap());
        }
        builder.finish()
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let lines = PolylineBuilder::from_points(vec![
            point("zeta", 0, 0.0, 0.0),
            point("alpha", 0, 5.0, 5.0),
            point("zeta", 1, 1.0, 0.0),
            point("alpha", 1, 6.0, 5.0),
        ]);

        let ids: Vec<_> = lines.iter().map(|l| l.road_id().unwrap()).collect();
        assert_eq!(ids, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_points_sorted_by_sequence_index() {
        let lines = PolylineBuilder::from_points(vec![
            point("R", 2, 2.0, 0.0),
            point("R", 0, 0.0, 0.0),
            point("R", 1, 1.0, 0.0),
        ]);
        let road = lines.into_iter().next().unwrap().into_result().unwrap();
        let xs: Vec<f64> = road.line.coords().map(|c| c.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_one_line_per_road_with_all_points() {
        let rows = vec![
            RoadRow::new(0, "A", "[[(0, 0), (1, 0), (2, 0)]]"),
            RoadRow::new(1, "B", "[[(0, 5), (0, 6)]]"),
            RoadRow::new(2, "C", "[[(7, 7), (8, 8), (9, 9), (10, 10)]]"),
        ];
        let lines = build_rows(&rows);

        assert_eq!(lines.len(), 3);
        let counts: Vec<usize> = lines
            .into_iter()
            .map(|l| l.into_result().unwrap().line.0.len())
            .collect();
        assert_eq!(counts, vec![3, 2, 4]);
    }

    #[test]
    fn test_road_split_across_rows_merges() {
        let mut first = RoadRow::new(0, "R1", "[[(0, 0), (0, 1)]]");
        first.attributes.insert("grid_id".into(), "G1 Palembang".into());
        let mut second = RoadRow::new(3, "R1", "[[(0, 2), (0, 3)]]");
        second.attributes.insert("grid_id".into(), "G2 Palembang".into());

        let lines = build_rows(&[first, second]);
        assert_eq!(lines.len(), 1);

        let road = lines.into_iter().next().unwrap().into_result().unwrap();
        let ys: Vec<f64> = road.line.coords().map(|c| c.y).collect();
        assert_eq!(ys, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(road.row, 0);
        assert_eq!(road.attributes["grid_id"], "G1 Palembang");
    }

    #[test]
    fn test_single_point_is_degenerate() {
        let rows = vec![RoadRow::new(0, "lonely", "[[(104.7, -2.9)]]")];
        let lines = build_rows(&rows);

        assert!(matches!(&lines[0], Polyline::Degenerate { points, .. } if points.len() == 1));
        match lines.into_iter().next().unwrap().into_result() {
            Err(GapError::Degenerate { road_id, points }) => {
                assert_eq!(road_id, "lonely");
                assert_eq!(points, 1);
            }
            other => panic!("expected degenerate error, got {other:?}"),
        }
    }

    #[test]
    fn test_repeated_points_are_preserved() {
        let lines = PolylineBuilder::from_points(vec![
            point("R", 0, 1.0, 1.0),
            point("R", 1, 1.0, 1.0),
            point("R", 2, 2.0, 2.0),
        ]);
        let road = lines.into_iter().next().unwrap().into_result().unwrap();
        assert_eq!(road.line.0.len(), 3);
        assert_eq!(road.line.0[0], road.line.0[1]);
    }

    #[test]
    fn test_empty_cell_is_zero_point_degenerate() {
        let rows = vec![RoadRow::new(0, "blank", "[[]]")];
        let lines = build_rows(&rows);
        assert_eq!(lines.len(), 1);

        match lines.into_iter().next().unwrap().into_result() {
            Err(e @ GapError::Degenerate { points: 0, .. }) => {
                assert_eq!(e.kind(), crate::error::ErrorKind::DegenerateGeometryError);
            }
            other => panic!("expected zero-point degenerate road, got {other:?}"),
        }
    }
}
