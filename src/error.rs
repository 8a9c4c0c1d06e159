//! Error taxonomy and run reporting.
//!
//! Row-level problems (parse, schema, degenerate geometry) can be isolated to
//! the offending row; reference-system, configuration and projection problems
//! always end the run. Whatever happens, a run produces a [`RunReport`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GapError>;

#[derive(Error, Debug)]
pub enum GapError {
    /// Coordinate cell could not be read as nested coordinate pairs
    #[error("malformed coordinates for road {road_id}: {message}")]
    Parse { road_id: String, message: String },

    /// Required column, property or geometry is missing
    #[error("missing {column}: {context}")]
    Schema { column: String, context: String },

    /// Undeclared, unsupported or mismatched reference system
    #[error("reference system error: {0}")]
    ReferenceSystem(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A road with fewer than two points cannot form a line
    #[error("road {road_id} has {points} point(s), at least 2 are required")]
    Degenerate { road_id: String, points: usize },

    #[error("projection failed: {0}")]
    Projection(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    GeoJson(#[from] geojson::Error),
}

/// Coarse classification used in run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ParseError,
    SchemaError,
    ReferenceSystemError,
    ConfigError,
    DegenerateGeometryError,
    IoError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ParseError => "ParseError",
            ErrorKind::SchemaError => "SchemaError",
            ErrorKind::ReferenceSystemError => "ReferenceSystemError",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::DegenerateGeometryError => "DegenerateGeometryError",
            ErrorKind::IoError => "IoError",
        };
        f.write_str(name)
    }
}

impl GapError {
    pub fn parse(road_id: impl Into<String>, message: impl Into<String>) -> Self {
        GapError::Parse {
            road_id: road_id.into(),
            message: message.into(),
        }
    }

    pub fn schema(column: impl Into<String>, context: impl Into<String>) -> Self {
        GapError::Schema {
            column: column.into(),
            context: context.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GapError::Parse { .. } | GapError::Json(_) | GapError::GeoJson(_) => {
                ErrorKind::ParseError
            }
            GapError::Schema { .. } => ErrorKind::SchemaError,
            GapError::ReferenceSystem(_) | GapError::Projection(_) => {
                ErrorKind::ReferenceSystemError
            }
            GapError::Config(_) => ErrorKind::ConfigError,
            GapError::Degenerate { .. } => ErrorKind::DegenerateGeometryError,
            GapError::Io(_) | GapError::Csv(_) => ErrorKind::IoError,
        }
    }

    /// Whether the error can be confined to a single input row
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            GapError::Parse { .. } | GapError::Schema { .. } | GapError::Degenerate { .. }
        )
    }
}

/// One input row that did not make it into the matched set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    /// Road id when known, otherwise `row <n>`
    pub row: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Summary of a pipeline run, successful or not
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<RowFailure>,
}

impl RunReport {
    pub fn record_failure(&mut self, row: impl Into<String>, error: &GapError) {
        self.failures.push(RowFailure {
            row: row.into(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows attempted, {} succeeded, {} failed",
            self.attempted,
            self.succeeded,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}: {}", failure.row, failure.kind)?;
        }
        Ok(())
    }
}

/// A run that was aborted, together with what had been processed so far
#[derive(Error, Debug)]
#[error("run aborted ({report}): {error}")]
pub struct RunFailure {
    pub report: RunReport,
    #[source]
    pub error: GapError,
}
