//! File formats at the edges of the pipeline.

pub mod csv;
pub mod geojson;

pub use self::csv::{read_road_rows, read_road_rows_from, RoadTable};
pub use self::geojson::{
    parse_lines, parse_polygons, parse_roads, read_lines, read_polygons, read_roads,
    to_feature_collection, write_selected, RoadFeatures,
};
