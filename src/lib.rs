//! Gapcheck - finds roads that run through or beside restricted areas
//!
//! This library provides the parsing, reprojection, buffering and matching
//! stages used by the `justify` binary.

pub mod buffer;
pub mod config;
pub mod crs;
pub mod error;
pub mod flatten;
pub mod io;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod polyline;

pub use config::{JustifyConfig, RowPolicy};
pub use error::{ErrorKind, GapError, Result, RunFailure, RunReport};
pub use models::{Layer, ReferenceSystem, RoadGeometry};
pub use pipeline::{Pipeline, RestrictedInputs, RunOutput};
