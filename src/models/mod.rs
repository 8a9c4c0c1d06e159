//! Core data models for the road validation pipeline.

pub mod crs;
pub mod layer;
pub mod restricted;
pub mod road;

pub use crs::ReferenceSystem;
pub use layer::Layer;
pub use restricted::{BufferedZone, RestrictedLine, RestrictedPolygon, RestrictionCategory, Tags};
pub use road::{Attributes, MatchResult, PointRecord, RoadGeometry, RoadRow};
