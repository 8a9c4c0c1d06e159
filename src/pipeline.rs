//! End-to-end run: rows → roads → shared reference system → zones → matches.
//!
//! Every stage hands its result to the next as a plain value; nothing is cached
//! between runs. Row-level problems are isolated or fatal according to the
//! configured [`RowPolicy`], and every run ends with a [`RunReport`].

use hashbrown::HashMap;
use tracing::{info, warn};

use crate::buffer::RestrictedZoneBuffer;
use crate::config::{JustifyConfig, RowPolicy};
use crate::crs::CrsNormalizer;
use crate::error::{GapError, Result, RunFailure, RunReport};
use crate::flatten::CoordinateFlattener;
use crate::io::{RoadFeatures, RoadTable};
use crate::matcher::{MatchOutcome, SpatialMatcher};
use crate::models::{Layer, RestrictedLine, RestrictedPolygon, RoadGeometry, RoadRow};
use crate::polyline::PolylineBuilder;

/// Restricted-area source layers; lines are optional
#[derive(Debug, Clone)]
pub struct RestrictedInputs {
    pub polygons: Layer<RestrictedPolygon>,
    pub lines: Option<Layer<RestrictedLine>>,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub outcome: MatchOutcome,
    pub report: RunReport,
}

impl RunOutput {
    /// Intersecting roads in WGS84, ready to be written out
    pub fn selected_layer(&self) -> Layer<RoadGeometry> {
        self.outcome.selected_layer()
    }
}

pub struct Pipeline {
    config: JustifyConfig,
    buffer: RestrictedZoneBuffer,
    matcher: SpatialMatcher,
}

impl Pipeline {
    pub fn new(config: JustifyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            buffer: RestrictedZoneBuffer::new(config.buffer_meters)?,
            matcher: SpatialMatcher::new(config.parallel),
            config,
        })
    }

    pub fn config(&self) -> &JustifyConfig {
        &self.config
    }

    /// Record a row-scoped error under the skip policy, otherwise hand it back
    fn isolate(&self, report: &mut RunReport, label: &str, error: GapError) -> Result<()> {
        if self.config.row_policy == RowPolicy::Skip && error.is_row_scoped() {
            warn!("Skipping {}: {}", label, error);
            report.record_failure(label, &error);
            Ok(())
        } else {
            Err(error)
        }
    }

    /// Flatten rows and build one road per id.
    ///
    /// Rows that fail to parse and roads left with fewer than two points are
    /// recorded in `report`; `succeeded` counts the rows that ended up in a road.
    /// The caller accounts for `attempted`.
    pub fn build_roads(&self, rows: &[RoadRow], report: &mut RunReport) -> Result<Vec<RoadGeometry>> {
        let mut builder = PolylineBuilder::new();
        let mut rows_per_road: HashMap<&str, usize> = HashMap::new();

        for (row, flat) in rows.iter().zip(CoordinateFlattener::flatten(rows)) {
            match flat {
                Ok(flat) => {
                    builder.add_row(&flat);
                    *rows_per_road.entry(row.road_id.as_str()).or_default() += 1;
                }
                Err(e) => self.isolate(report, &row.road_id, e)?,
            }
        }

        let mut roads = Vec::with_capacity(builder.len());
        for polyline in builder.finish() {
            let label = polyline.road_id().unwrap_or_default().to_string();
            match polyline.into_result() {
                Ok(road) => {
                    report.succeeded += rows_per_road.get(label.as_str()).copied().unwrap_or(0);
                    roads.push(road);
                }
                Err(e) => self.isolate(report, &label, e)?,
            }
        }

        Ok(roads)
    }

    /// Run from raw CSV-style rows in the configured input reference system
    pub fn run_rows(
        &self,
        rows: &[RoadRow],
        restricted: &RestrictedInputs,
    ) -> std::result::Result<RunOutput, RunFailure> {
        self.run_row_set(rows, Vec::new(), restricted)
    }

    /// Run from a CSV read, counting its unreadable records as failed rows
    pub fn run_table(
        &self,
        table: RoadTable,
        restricted: &RestrictedInputs,
    ) -> std::result::Result<RunOutput, RunFailure> {
        self.run_row_set(&table.rows, table.failures, restricted)
    }

    fn run_row_set(
        &self,
        rows: &[RoadRow],
        rejected: Vec<(String, GapError)>,
        restricted: &RestrictedInputs,
    ) -> std::result::Result<RunOutput, RunFailure> {
        let mut report = RunReport {
            attempted: rejected.len() + rows.len(),
            ..RunReport::default()
        };

        for (label, error) in rejected {
            if let Err(error) = self.isolate(&mut report, &label, error) {
                return Err(RunFailure { report, error });
            }
        }

        let crs = match self.config.input_reference_system() {
            Ok(crs) => crs,
            Err(error) => return Err(RunFailure { report, error }),
        };
        let roads = match self.build_roads(rows, &mut report) {
            Ok(roads) => roads,
            Err(error) => return Err(RunFailure { report, error }),
        };

        self.run(Layer::new(crs, roads), restricted, report)
    }

    /// Run from roads already read as features
    pub fn run_features(
        &self,
        roads: RoadFeatures,
        restricted: &RestrictedInputs,
    ) -> std::result::Result<RunOutput, RunFailure> {
        let mut report = RunReport {
            attempted: roads.attempted,
            succeeded: roads.layer.len(),
            failures: Vec::new(),
        };

        for (label, error) in roads.failures {
            if let Err(error) = self.isolate(&mut report, &label, error) {
                return Err(RunFailure { report, error });
            }
        }

        self.run(roads.layer, restricted, report)
    }

    /// Normalize, buffer and match a road layer. Failures here end the run.
    pub fn run(
        &self,
        roads: Layer<RoadGeometry>,
        restricted: &RestrictedInputs,
        report: RunReport,
    ) -> std::result::Result<RunOutput, RunFailure> {
        match self.process(&roads, restricted) {
            Ok(outcome) => {
                info!(
                    "Found {} intersecting roads ({})",
                    outcome.selected_count(),
                    report
                );
                Ok(RunOutput { outcome, report })
            }
            Err(error) => Err(RunFailure { report, error }),
        }
    }

    fn process(
        &self,
        roads: &Layer<RoadGeometry>,
        restricted: &RestrictedInputs,
    ) -> Result<MatchOutcome> {
        let normalized =
            CrsNormalizer::normalize(roads, &restricted.polygons, restricted.lines.as_ref())?;
        let zones = self.buffer.buffer(&normalized.polygons)?;
        self.matcher
            .match_roads(&normalized.roads, &zones, normalized.lines.as_ref())
    }
}
