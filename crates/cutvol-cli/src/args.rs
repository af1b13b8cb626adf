//! Command-line argument parsing.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use cutvol::{Cartographic, MeasureConfig};

/// Default synthetic terrain base height in metres.
const DEFAULT_BASE_HEIGHT: f64 = 0.0;
/// Default synthetic terrain relief amplitude in metres.
const DEFAULT_AMPLITUDE: f64 = 50.0;
/// Default synthetic terrain wavelength in metres.
const DEFAULT_WAVELENGTH: f64 = 2000.0;

/// Where terrain heights come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ServiceKind {
    /// Analytic rolling terrain, no network access.
    #[default]
    Synthetic,
    /// The Open-Elevation HTTP API.
    OpenElevation,
}

#[derive(Parser, Debug)]
#[command(name = "cutvol", version, about = "Measure the terrain cut volume inside a polygon")]
pub struct CliArgs {
    /// Polygon corner as `lon,lat` in degrees. Repeat for each corner.
    #[arg(long = "point", value_parser = parse_point, allow_hyphen_values = true)]
    pub points: Vec<(f64, f64)>,

    /// JSON file with the polygon corners as `[[lon, lat], ...]` in degrees.
    #[arg(long, conflicts_with = "points")]
    pub polygon: Option<PathBuf>,

    /// JSON file with measurement settings; flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Subdivision detail level (1-16).
    #[arg(long)]
    pub detail_level: Option<u32>,

    /// Display lift of the meshes in metres.
    #[arg(long, allow_hyphen_values = true)]
    pub vertical_offset: Option<f64>,

    /// Number of sequential elevation batches.
    #[arg(long)]
    pub batches: Option<usize>,

    /// After publishing, re-measure at this detail level.
    #[arg(long)]
    pub refine: Option<u32>,

    /// Cancel sampling if it takes longer than this many seconds.
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Elevation source.
    #[arg(long, value_enum, default_value_t = ServiceKind::default())]
    pub service: ServiceKind,

    /// Base URL of the Open-Elevation server.
    #[arg(long)]
    pub url: Option<String>,

    /// Override the terrain level reported by the elevation source.
    #[arg(long)]
    pub max_level: Option<u32>,

    /// Synthetic terrain base height in metres.
    #[arg(long, default_value_t = DEFAULT_BASE_HEIGHT, allow_hyphen_values = true)]
    pub base_height: f64,

    /// Synthetic terrain relief amplitude in metres.
    #[arg(long, default_value_t = DEFAULT_AMPLITUDE)]
    pub amplitude: f64,

    /// Synthetic terrain wavelength in metres.
    #[arg(long, default_value_t = DEFAULT_WAVELENGTH)]
    pub wavelength: f64,

    /// Write a JSON report to this file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Include the fill mesh and wireframe buffers in the report.
    #[arg(long)]
    pub include_meshes: bool,
}

/// Parse a `lon,lat` pair in degrees.
fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let (lon, lat) = s
        .split_once(',')
        .ok_or_else(|| format!("expected lon,lat, got '{s}'"))?;
    let lon = lon
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid longitude: {e}"))?;
    let lat = lat
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid latitude: {e}"))?;

    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("longitude out of range: {lon}"));
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude out of range: {lat}"));
    }
    Ok((lon, lat))
}

impl CliArgs {
    /// Measurement settings from the config file and flags.
    pub fn measure_config(&self) -> anyhow::Result<MeasureConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => MeasureConfig::default(),
        };

        if let Some(detail_level) = self.detail_level {
            config.detail_level = detail_level;
        }
        if let Some(vertical_offset) = self.vertical_offset {
            config.vertical_offset = vertical_offset;
        }
        if let Some(batches) = self.batches {
            config.batch_divisions = batches;
        }
        Ok(config.normalized())
    }

    /// The polygon corners, at height zero.
    pub fn corners(&self) -> anyhow::Result<Vec<Cartographic>> {
        let degrees = match &self.polygon {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let corners: Vec<[f64; 2]> = serde_json::from_str(&text)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                corners.into_iter().map(|[lon, lat]| (lon, lat)).collect()
            }
            None => self.points.clone(),
        };

        if degrees.is_empty() {
            bail!("no polygon given; pass --point lon,lat at least three times or --polygon FILE");
        }

        Ok(degrees
            .into_iter()
            .map(|(lon, lat)| Cartographic::from_degrees(lon, lat, 0.0))
            .collect())
    }
}
