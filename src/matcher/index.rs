//! Spatial index over the restriction surface.

use geo::{BoundingRect, Intersects, LineString, MultiLineString, MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use crate::models::RestrictionCategory;

/// Geometry of one restriction surface member
#[derive(Debug, Clone, PartialEq)]
pub enum RestrictionShape {
    /// Buffered polygon, already carrying its safety margin
    Zone(MultiPolygon<f64>),
    /// Raw restricted line, checked by direct crossing
    Line(MultiLineString<f64>),
}

impl RestrictionShape {
    fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            RestrictionShape::Zone(zone) => zone.bounding_rect(),
            RestrictionShape::Line(line) => line.bounding_rect(),
        }
    }

    /// Shares at least one point with `road`, boundary contact included
    pub fn intersects(&self, road: &LineString<f64>) -> bool {
        match self {
            RestrictionShape::Zone(zone) => zone.iter().any(|polygon| road.intersects(polygon)),
            RestrictionShape::Line(line) => line.iter().any(|part| road.intersects(part)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestrictionMember {
    pub shape: RestrictionShape,
    pub category: RestrictionCategory,
}

/// Wrapper for R-tree indexing of surface members
#[derive(Debug, Clone)]
struct IndexedMember {
    idx: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedMember {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn rect_envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// R-tree over restriction members keyed by bounding box
pub struct RestrictionIndex {
    tree: RTree<IndexedMember>,
    members: Vec<RestrictionMember>,
}

impl RestrictionIndex {
    pub fn build(members: Vec<RestrictionMember>) -> Self {
        info!("Building spatial index for {} restriction members...", members.len());

        // Empty geometries have no envelope and can never intersect anything
        let indexed: Vec<IndexedMember> = members
            .iter()
            .enumerate()
            .filter_map(|(idx, member)| {
                member.shape.bounding_rect().map(|rect| IndexedMember {
                    idx,
                    envelope: rect_envelope(rect),
                })
            })
            .collect();

        let tree = RTree::bulk_load(indexed);
        info!("Spatial index built with {} entries", tree.size());

        Self { tree, members }
    }

    /// Indices of all members intersecting `road`, ascending
    pub fn hits(&self, road: &LineString<f64>) -> Vec<usize> {
        let Some(rect) = road.bounding_rect() else {
            return Vec::new();
        };

        // Envelope candidates first, then the exact predicate
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&rect_envelope(rect))
            .filter(|im| self.members[im.idx].shape.intersects(road))
            .map(|im| im.idx)
            .collect();
        hits.sort_unstable();
        hits
    }

    pub fn member(&self, idx: usize) -> Option<&RestrictionMember> {
        self.members.get(idx)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn zone(min: f64, max: f64) -> RestrictionMember {
        RestrictionMember {
            shape: RestrictionShape::Zone(
                polygon![(x: min, y: min), (x: max, y: min), (x: max, y: max), (x: min, y: max)]
                    .into(),
            ),
            category: RestrictionCategory::Other,
        }
    }

    #[test]
    fn test_empty_index() {
        let index = RestrictionIndex::build(vec![]);
        assert!(index.is_empty());
        let road = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!(index.hits(&road).is_empty());
    }

    #[test]
    fn test_hits_filter_envelope_candidates() {
        let index = RestrictionIndex::build(vec![zone(-1.0, 1.0), zone(100.0, 101.0), zone(2.0, 3.0)]);
        let road = LineString::from(vec![(0.0, 0.0), (0.0, 10.0)]);
        assert_eq!(index.hits(&road), vec![0]);

        // Envelope overlaps the third zone but the line passes beside it
        let diagonal = LineString::from(vec![(0.0, 0.0), (3.0, 10.0)]);
        assert_eq!(index.hits(&diagonal), vec![0]);
    }

    #[test]
    fn test_line_member_crossing() {
        let fence = RestrictionMember {
            shape: RestrictionShape::Line(
                LineString::from(vec![(-5.0, 5.0), (5.0, 5.0)]).into(),
            ),
            category: RestrictionCategory::Barrier,
        };
        let index = RestrictionIndex::build(vec![fence]);

        let crossing = LineString::from(vec![(0.0, 0.0), (0.0, 10.0)]);
        let parallel = LineString::from(vec![(-5.0, 6.0), (5.0, 6.0)]);
        assert_eq!(index.hits(&crossing), vec![0]);
        assert!(index.hits(&parallel).is_empty());
    }
}
