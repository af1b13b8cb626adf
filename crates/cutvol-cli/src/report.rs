//! JSON report of a published measurement.

use cutvol::{MeasureConfig, Measurement, MeshBuffers};
use serde::Serialize;

/// Everything the CLI knows about a published measurement.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    /// Cut volume in cubic metres.
    pub volume: f64,
    /// Label text, e.g. `"1234.57 m³"`.
    pub label: String,
    /// Floor height in metres.
    pub min_height: f64,
    /// Highest sampled height in metres.
    pub max_height: f64,
    /// Polygon centroid as `[lon, lat]` in degrees.
    pub centroid: [f64; 2],
    /// Label anchor in ECEF metres.
    pub label_position: [f64; 3],
    /// Number of dense-mesh triangles sampled.
    pub triangle_count: usize,
    /// Detail level the measurement was taken at.
    pub detail_level: u32,
    /// Display lift of the meshes in metres.
    pub vertical_offset: f64,
    /// Fill mesh buffers, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<&'a MeshBuffers>,
    /// Wireframe buffers, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wireframe: Option<&'a MeshBuffers>,
}

impl<'a> Report<'a> {
    /// Build a report, optionally embedding the mesh buffers.
    pub fn new(measurement: &'a Measurement, config: &MeasureConfig, include_meshes: bool) -> Self {
        let result = &measurement.result;
        Self {
            volume: result.volume,
            label: measurement.label_text(),
            min_height: result.min_height,
            max_height: result.max_height,
            centroid: [
                result.centroid.longitude_degrees(),
                result.centroid.latitude_degrees(),
            ],
            label_position: measurement.label_position.to_array(),
            triangle_count: result.triangle_count,
            detail_level: config.detail_level,
            vertical_offset: config.vertical_offset,
            fill: include_meshes.then_some(&measurement.fill),
            wireframe: include_meshes.then_some(&measurement.wireframe),
        }
    }
}
