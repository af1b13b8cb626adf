//! Shared measurement types.
//!
//! These types carry the mesh and results between the pipeline stages and
//! out to the renderer and UI.

use std::fmt;

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::ellipsoid::{Cartographic, Ellipsoid, SurfacePoint};

/// Three surface points forming one mesh triangle.
///
/// Vertices wind counter-clockwise when seen from above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle(pub [SurfacePoint; 3]);

impl Triangle {
    /// The triangle's vertices in winding order.
    #[must_use]
    pub fn vertices(&self) -> &[SurfacePoint; 3] {
        &self.0
    }

    /// Rebuild triangles from a flat vertex array (three vertices per triangle).
    ///
    /// Trailing vertices that do not form a whole triangle are ignored.
    #[must_use]
    pub fn from_flat(points: &[SurfacePoint]) -> Vec<Triangle> {
        points
            .chunks_exact(3)
            .map(|c| Triangle([c[0], c[1], c[2]]))
            .collect()
    }

    /// Flatten triangles into their vertex array, preserving order.
    #[must_use]
    pub fn flatten(triangles: &[Triangle]) -> Vec<SurfacePoint> {
        triangles.iter().flat_map(|t| t.0).collect()
    }

    /// Area of the triangle's footprint at height zero, by Heron's formula.
    ///
    /// Near-degenerate slivers can produce a slightly negative radicand; those
    /// contribute zero area.
    #[must_use]
    pub fn footprint_area(&self, ellipsoid: &Ellipsoid) -> f64 {
        let [p1, p2, p3] = self.0.map(|v| v.position_at_height(ellipsoid, 0.0));
        heron_area(p1, p2, p3)
    }
}

/// Area of a 3D triangle from its three side lengths.
#[must_use]
pub fn heron_area(p1: DVec3, p2: DVec3, p3: DVec3) -> f64 {
    let a = p1.distance(p2);
    let b = p2.distance(p3);
    let c = p3.distance(p1);

    let s = (a + b + c) / 2.0;
    (s * (s - a) * (s - b) * (s - c)).max(0.0).sqrt()
}

/// The outcome of one completed measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeResult {
    /// Total cut volume in cubic metres.
    pub volume: f64,
    /// Highest terrain height observed over the dense mesh.
    pub max_height: f64,
    /// The floor height the volume is measured down to.
    pub min_height: f64,
    /// Centroid of the original polygon (height zero).
    pub centroid: Cartographic,
    /// Number of dense-mesh triangles the estimate was integrated over.
    pub triangle_count: usize,
}

impl VolumeResult {
    /// Text for the on-globe volume label.
    #[must_use]
    pub fn label_text(&self) -> String {
        self.to_string()
    }

    /// Where the volume label is placed: above the centroid, `offset` metres
    /// over the highest sampled point.
    #[must_use]
    pub fn label_position(&self, ellipsoid: &Ellipsoid, offset: f64) -> DVec3 {
        ellipsoid.cartographic_to_cartesian(self.centroid.with_height(self.max_height + offset))
    }
}

impl fmt::Display for VolumeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} m³", self.volume)
    }
}

/// How the renderer should interpret a mesh's index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// Filled triangles.
    Triangles,
    /// Lines.
    Lines,
}

/// A bounding sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    /// Centre in Cartesian coordinates.
    pub center: DVec3,
    /// Radius in metres.
    pub radius: f64,
}

/// Renderable buffers for one mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshBuffers {
    /// Packed xyz positions in metres.
    pub positions: Vec<f64>,
    /// Packed RGBA colours, one per vertex.
    pub colors: Vec<u8>,
    /// Vertex indices, three per triangle.
    pub indices: Vec<u32>,
    /// How the indices are drawn.
    pub topology: Topology,
    /// Bounds of `positions`.
    pub bounding_sphere: BoundingSphere,
    /// Model matrix applying the vertical display offset.
    pub model_matrix: DMat4,
}

impl MeshBuffers {
    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Vertex position by index.
    #[must_use]
    pub fn position(&self, index: usize) -> DVec3 {
        DVec3::from_slice(&self.positions[index * 3..index * 3 + 3])
    }

    /// Vertex colour by index.
    #[must_use]
    pub fn color(&self, index: usize) -> [u8; 4] {
        let c = &self.colors[index * 4..index * 4 + 4];
        [c[0], c[1], c[2], c[3]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heron_right_triangle() {
        let area = heron_area(DVec3::ZERO, DVec3::new(3.0, 0.0, 0.0), DVec3::new(0.0, 4.0, 0.0));
        assert!((area - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_heron_degenerate_is_zero() {
        let area = heron_area(
            DVec3::ZERO,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(2.0, 1e-17, 0.0),
        );
        assert!(area.is_finite());
        assert!(area < 1e-9);
    }

    #[test]
    fn test_flatten_round_trip_preserves_order() {
        let ellipsoid = Ellipsoid::WGS84;
        let points: Vec<SurfacePoint> = (0..6)
            .map(|i| {
                SurfacePoint::from_cartographic(
                    &ellipsoid,
                    Cartographic::from_degrees(f64::from(i), 0.0, 0.0),
                )
            })
            .collect();

        let triangles = Triangle::from_flat(&points);
        assert_eq!(triangles.len(), 2);
        assert_eq!(Triangle::flatten(&triangles), points);
    }

    #[test]
    fn test_label_text() {
        let result = VolumeResult {
            volume: 1234.567,
            max_height: 10.0,
            min_height: 0.0,
            centroid: Cartographic::default(),
            triangle_count: 1,
        };
        assert_eq!(result.label_text(), "1234.57 m³");
    }

    #[test]
    fn test_buffer_accessors() {
        let buffers = MeshBuffers {
            positions: vec![0.0; 9],
            colors: vec![255; 12],
            indices: vec![0, 1, 2],
            topology: Topology::Lines,
            bounding_sphere: BoundingSphere {
                center: DVec3::ZERO,
                radius: 0.0,
            },
            model_matrix: DMat4::IDENTITY,
        };
        assert_eq!(buffers.position(1), DVec3::ZERO);
        assert_eq!(buffers.vertex_count(), 3);
        assert_eq!(buffers.color(2), [255; 4]);
    }
}
