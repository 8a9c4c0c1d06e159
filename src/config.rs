use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::buffer::{RestrictedZoneBuffer, DEFAULT_BUFFER_METERS};
use crate::error::{GapError, Result};
use crate::models::ReferenceSystem;

/// What to do when a single input row cannot be turned into a road
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicy {
    /// Record the row in the run report and continue
    #[default]
    Skip,
    /// End the run on the first bad row
    Abort,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ColumnConfig {
    pub road_id: String,
    pub coordinates: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            road_id: "road_id".to_string(),
            coordinates: "coordinates".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct JustifyConfig {
    pub buffer_meters: f64,
    pub row_policy: RowPolicy,
    pub parallel: bool,
    /// Reference system of CSV coordinates, EPSG:4326 when unset
    pub input_crs: Option<String>,
    pub columns: ColumnConfig,
}

impl Default for JustifyConfig {
    fn default() -> Self {
        Self {
            buffer_meters: DEFAULT_BUFFER_METERS,
            row_policy: RowPolicy::default(),
            parallel: true,
            input_crs: None,
            columns: ColumnConfig::default(),
        }
    }
}

impl JustifyConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: JustifyConfig = toml::from_str(&content).map_err(|e| {
            GapError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a run meaningless before any work is done
    pub fn validate(&self) -> Result<()> {
        RestrictedZoneBuffer::new(self.buffer_meters)?;
        self.input_reference_system()?;
        if self.columns.coordinates.is_empty() {
            return Err(GapError::Config("coordinate column name is empty".into()));
        }
        Ok(())
    }

    pub fn input_reference_system(&self) -> Result<ReferenceSystem> {
        match &self.input_crs {
            Some(crs) => ReferenceSystem::parse(crs),
            None => Ok(ReferenceSystem::WGS84),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = JustifyConfig::default();
        assert_eq!(config.buffer_meters, 100.0);
        assert_eq!(config.row_policy, RowPolicy::Skip);
        assert!(config.parallel);
        assert_eq!(config.input_reference_system().unwrap(), ReferenceSystem::WGS84);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
buffer_meters = 25.0
row_policy = "abort"

[columns]
road_id = "way_id"
"#
        )
        .unwrap();

        let config = JustifyConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.buffer_meters, 25.0);
        assert_eq!(config.row_policy, RowPolicy::Abort);
        assert_eq!(config.columns.road_id, "way_id");
        assert_eq!(config.columns.coordinates, "coordinates");
    }

    #[test]
    fn test_non_positive_buffer_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "buffer_meters = 0.0").unwrap();
        assert!(matches!(
            JustifyConfig::load_from_file(file.path()),
            Err(GapError::Config(_))
        ));
    }
}
