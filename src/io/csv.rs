use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::ColumnConfig;
use crate::error::{GapError, Result};
use crate::models::{Attributes, RoadRow};

/// Road rows read from CSV, with records that could not be read set aside
#[derive(Debug, Default)]
pub struct RoadTable {
    pub rows: Vec<RoadRow>,
    /// (row label, error) per unreadable record
    pub failures: Vec<(String, GapError)>,
}

impl RoadTable {
    /// Records seen, readable or not
    pub fn attempted(&self) -> usize {
        self.rows.len() + self.failures.len()
    }
}

/// Load road rows from a CSV file, transparently decompressing `.gz`
pub fn read_road_rows(path: &Path, columns: &ColumnConfig) -> Result<RoadTable> {
    info!("Loading road rows from {}", path.display());

    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    read_road_rows_from(reader, columns)
}

/// Non-blank id cell, if any
fn id_cell<'r>(record: &'r StringRecord, id_idx: Option<usize>) -> Option<&'r str> {
    id_idx
        .and_then(|idx| record.get(idx))
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

/// Load road rows from any CSV source.
///
/// The coordinate column is required. Rows without an id (no id column, or a
/// blank cell) become their own road, named after their position. Records
/// with the wrong field count or invalid UTF-8 are returned as failures;
/// only I/O errors end the read.
pub fn read_road_rows_from<R: Read>(reader: R, columns: &ColumnConfig) -> Result<RoadTable> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    // Find column indices
    let coord_idx = headers
        .iter()
        .position(|h| h == columns.coordinates)
        .ok_or_else(|| {
            GapError::schema(
                format!("column '{}'", columns.coordinates),
                "road CSV header has no coordinate column",
            )
        })?;
    let id_idx = headers.iter().position(|h| h == columns.road_id);
    if id_idx.is_none() {
        warn!(
            "Column '{}' not found, using row numbers as road ids",
            columns.road_id
        );
    }

    let mut table = RoadTable::default();
    for (row, result) in csv_reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                let label = format!("row {}", row);
                table
                    .failures
                    .push((label.clone(), GapError::schema(label, e.to_string())));
                continue;
            }
        };

        if record.len() != headers.len() {
            let label = id_cell(&record, id_idx)
                .map(str::to_string)
                .unwrap_or_else(|| format!("row {}", row));
            let context = format!(
                "record has {} fields, header has {}",
                record.len(),
                headers.len()
            );
            table
                .failures
                .push((label, GapError::schema(format!("row {}", row), context)));
            continue;
        }

        let road_id = match id_cell(&record, id_idx) {
            Some(id) => id.to_string(),
            None => {
                if id_idx.is_some() {
                    debug!("Row {} has a blank road id", row);
                }
                format!("row-{}", row)
            }
        };

        let mut attributes = Attributes::new();
        for (idx, (header, value)) in headers.iter().zip(record.iter()).enumerate() {
            if idx != coord_idx {
                attributes.insert(header.to_string(), value.into());
            }
        }

        table.rows.push(RoadRow {
            row,
            road_id,
            coordinates: record.get(coord_idx).unwrap_or_default().to_string(),
            attributes,
        });
    }

    if !table.failures.is_empty() {
        warn!("{} unreadable road records set aside", table.failures.len());
    }
    info!("Loaded {} road rows", table.rows.len());
    Ok(table)
}
