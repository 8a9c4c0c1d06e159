//! Road justification run.
//!
//! Reads road rows (CSV) or road features (GeoJSON), checks them against
//! restricted polygons and lines, and writes the intersecting roads as GeoJSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use gapcheck::config::JustifyConfig;
use gapcheck::io;
use gapcheck::{Pipeline, RestrictedInputs, RowPolicy, RunFailure, RunOutput};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "justify")]
#[command(about = "Select roads that intersect buffered restricted areas")]
struct Args {
    /// Road input: .csv, .csv.gz or GeoJSON
    #[arg(short, long)]
    roads: PathBuf,

    /// Restricted polygons (GeoJSON)
    #[arg(short, long)]
    polygons: PathBuf,

    /// Restricted lines such as barriers (GeoJSON, optional)
    #[arg(short, long)]
    lines: Option<PathBuf>,

    /// Where to write the selected roads (GeoJSON)
    #[arg(short, long)]
    output: PathBuf,

    /// TOML settings file (optional)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the buffer distance in meters
    #[arg(long)]
    buffer_meters: Option<f64>,

    /// Stop on the first bad row instead of skipping it
    #[arg(long)]
    abort_on_row_error: bool,

    /// Match on a single thread
    #[arg(long)]
    sequential: bool,

    /// Property holding the road id in GeoJSON road input
    #[arg(long, default_value = "road_id")]
    id_property: String,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> Result<JustifyConfig> {
        let mut config = match &self.config {
            Some(path) => JustifyConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => JustifyConfig::default(),
        };

        if let Some(meters) = self.buffer_meters {
            config.buffer_meters = meters;
        }
        if self.abort_on_row_error {
            config.row_policy = RowPolicy::Abort;
        }
        if self.sequential {
            config.parallel = false;
        }

        config.validate().context("Invalid settings")?;
        Ok(config)
    }
}

fn is_csv(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".csv") || name.ends_with(".csv.gz")
}

fn read_restricted(args: &Args) -> Result<RestrictedInputs> {
    let polygons = io::read_polygons(&args.polygons)
        .with_context(|| format!("Failed to read polygons {}", args.polygons.display()))?;
    info!("Loaded {} restricted polygons", polygons.len());

    let lines = match &args.lines {
        Some(path) => {
            let lines = io::read_lines(path)
                .with_context(|| format!("Failed to read lines {}", path.display()))?;
            info!("Loaded {} restricted lines", lines.len());
            Some(lines)
        }
        None => None,
    };

    Ok(RestrictedInputs { polygons, lines })
}

fn run(args: &Args) -> Result<std::result::Result<RunOutput, RunFailure>> {
    let config = args.config()?;
    let pipeline = Pipeline::new(config).context("Failed to set up run")?;
    let restricted = read_restricted(args)?;

    info!("Reading roads from {}", args.roads.display());
    let outcome = if is_csv(&args.roads) {
        let table = io::read_road_rows(&args.roads, &pipeline.config().columns)
            .with_context(|| format!("Failed to read roads {}", args.roads.display()))?;
        info!("Loaded {} road records", table.attempted());
        pipeline.run_table(table, &restricted)
    } else {
        let roads = io::read_roads(&args.roads, &args.id_property)
            .with_context(|| format!("Failed to read roads {}", args.roads.display()))?;
        info!("Loaded {} road features", roads.attempted);
        pipeline.run_features(roads, &restricted)
    };

    Ok(outcome)
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match run(&args)? {
        Ok(output) => {
            let selected = output.selected_layer();
            io::write_selected(&args.output, &selected)
                .with_context(|| format!("Failed to write {}", args.output.display()))?;
            info!(
                "Wrote {} roads to {} ({})",
                selected.len(),
                args.output.display(),
                output.report
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            error!("{}", failure);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_format_by_extension() {
        assert!(is_csv(Path::new("roads.csv")));
        assert!(is_csv(Path::new("data/Roads.CSV.gz")));
        assert!(!is_csv(Path::new("roads.geojson")));
        assert!(!is_csv(Path::new("roads.json")));
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "justify",
            "--roads",
            "r.csv",
            "--polygons",
            "p.geojson",
            "--output",
            "out.geojson",
            "--buffer-meters",
            "20",
            "--abort-on-row-error",
            "--sequential",
        ]);
        let config = args.config().unwrap();
        assert_eq!(config.buffer_meters, 20.0);
        assert_eq!(config.row_policy, RowPolicy::Abort);
        assert!(!config.parallel);
    }

    #[test]
    fn test_bad_buffer_flag_is_rejected() {
        let args = Args::parse_from([
            "justify",
            "-r",
            "r.csv",
            "-p",
            "p.geojson",
            "-o",
            "out.geojson",
            "--buffer-meters",
            "0",
        ]);
        assert!(args.config().is_err());
    }
}
