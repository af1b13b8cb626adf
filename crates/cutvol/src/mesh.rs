//! Renderable buffers for the fill mesh and its wireframe.
//!
//! The fill mesh is an open-bottomed prism per dense-mesh triangle: the
//! sampled top face plus three side walls down to the floor height. The
//! wireframe outlines the top faces only. Both are lifted for display by a
//! model matrix rather than by moving vertices.

use glam::{DMat4, DVec3};

use crate::config::{FillPalette, MeasureConfig, color_to_bytes};
use crate::ellipsoid::Ellipsoid;
use crate::error::{Error, Result};
use crate::types::{BoundingSphere, MeshBuffers, Topology, Triangle};

/// Index triples for one prism, relative to its first vertex.
///
/// Vertices 0..3 are the top face, 3..6 the matching floor vertices.
const PRISM_INDICES: [u32; 21] = [
    0, 1, 2, // top
    0, 1, 3, 1, 4, 3, // wall 0-1
    1, 2, 4, 2, 5, 4, // wall 1-2
    0, 2, 3, 2, 5, 3, // wall 2-0
];

/// Builds [`MeshBuffers`] from sampled triangles.
#[derive(Debug, Clone, Copy)]
pub struct MeshBuilder {
    ellipsoid: Ellipsoid,
    palette: FillPalette,
    vertical_offset: f64,
}

impl Default for MeshBuilder {
    fn default() -> Self {
        Self::from_config(&MeasureConfig::default())
    }
}

impl MeshBuilder {
    /// Create a mesh builder.
    #[must_use]
    pub fn new(ellipsoid: Ellipsoid, palette: FillPalette, vertical_offset: f64) -> Self {
        Self {
            ellipsoid,
            palette,
            vertical_offset,
        }
    }

    /// Create a mesh builder from session settings.
    #[must_use]
    pub fn from_config(config: &MeasureConfig) -> Self {
        Self::new(config.ellipsoid, config.palette, config.vertical_offset)
    }

    /// Build the coloured fill mesh.
    ///
    /// Top vertices are coloured by their height between `min_height` and
    /// `max_height`; floor vertices use the palette's floor colour.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolygon`] if the vertices cannot be indexed
    /// with `u32`.
    pub fn build_fill_mesh(
        &self,
        triangles: &[Triangle],
        min_height: f64,
        max_height: f64,
    ) -> Result<MeshBuffers> {
        indexed_vertex_count(triangles.len(), 6)?;
        let range = max_height - min_height;
        let floor_color = color_to_bytes(self.palette.floor);

        let mut positions = Vec::with_capacity(triangles.len() * 18);
        let mut colors = Vec::with_capacity(triangles.len() * 24);
        let mut indices = Vec::with_capacity(triangles.len() * PRISM_INDICES.len());

        let mut base = 0u32;
        for triangle in triangles {
            for vertex in triangle.vertices() {
                positions.extend_from_slice(&vertex.position().to_array());

                let ratio = if range > 0.0 {
                    (vertex.height() - min_height) / range
                } else {
                    0.0
                };
                colors.extend_from_slice(&color_to_bytes(self.palette.top_color(ratio)));
            }
            for vertex in triangle.vertices() {
                let bottom = vertex.position_at_height(&self.ellipsoid, min_height);
                positions.extend_from_slice(&bottom.to_array());
                colors.extend_from_slice(&floor_color);
            }

            indices.extend(PRISM_INDICES.iter().map(|&offset| base + offset));
            base += 6;
        }

        tracing::debug!(
            vertices = positions.len() / 3,
            indices = indices.len(),
            "built fill mesh"
        );

        Ok(self.finish(positions, colors, indices, Topology::Triangles))
    }

    /// Build the wireframe of the top faces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolygon`] if the vertices cannot be indexed
    /// with `u32`.
    pub fn build_wireframe(&self, triangles: &[Triangle]) -> Result<MeshBuffers> {
        indexed_vertex_count(triangles.len(), 3)?;
        let color = color_to_bytes(self.palette.wireframe);

        let mut positions = Vec::with_capacity(triangles.len() * 9);
        let mut colors = Vec::with_capacity(triangles.len() * 12);
        let mut indices = Vec::with_capacity(triangles.len() * 3);

        let mut base = 0u32;
        for triangle in triangles {
            for vertex in triangle.vertices() {
                positions.extend_from_slice(&vertex.position().to_array());
                colors.extend_from_slice(&color);
            }

            indices.extend([base, base + 1, base + 2]);
            base += 3;
        }

        tracing::debug!(vertices = positions.len() / 3, "built wireframe");

        Ok(self.finish(positions, colors, indices, Topology::Lines))
    }

    fn finish(
        &self,
        positions: Vec<f64>,
        colors: Vec<u8>,
        indices: Vec<u32>,
        topology: Topology,
    ) -> MeshBuffers {
        let bounding_sphere = bounding_sphere(&positions);
        let model_matrix =
            model_matrix(&self.ellipsoid, bounding_sphere.center, self.vertical_offset);

        MeshBuffers {
            positions,
            colors,
            indices,
            topology,
            bounding_sphere,
            model_matrix,
        }
    }
}

/// Total vertex count of a mesh, if every vertex fits a `u32` index.
fn indexed_vertex_count(triangles: usize, vertices_per_triangle: usize) -> Result<u32> {
    triangles
        .checked_mul(vertices_per_triangle)
        .and_then(|count| u32::try_from(count).ok())
        .ok_or_else(|| {
            Error::invalid_polygon(format!(
                "{triangles} triangles exceed the 32-bit vertex index range"
            ))
        })
}

impl MeshBuffers {
    /// Recompute the model matrix for a new vertical offset.
    ///
    /// Vertex data is left untouched.
    pub fn set_vertical_offset(&mut self, ellipsoid: &Ellipsoid, vertical_offset: f64) {
        self.model_matrix = model_matrix(ellipsoid, self.bounding_sphere.center, vertical_offset);
    }
}

/// A transform that lifts geometry by `vertical_offset` metres along the
/// local up direction at `center`.
///
/// Returns the identity for a centre with no local frame.
#[must_use]
pub fn model_matrix(ellipsoid: &Ellipsoid, center: DVec3, vertical_offset: f64) -> DMat4 {
    if center == DVec3::ZERO || !center.is_finite() {
        return DMat4::IDENTITY;
    }

    let to_world = ellipsoid.east_north_up_to_fixed_frame(center);
    let lift = DMat4::from_translation(DVec3::new(0.0, 0.0, vertical_offset));
    to_world * lift * to_world.inverse()
}

/// A tight bounding sphere for packed xyz positions.
///
/// Computes both Ritter's sphere and the sphere centred on the bounding box,
/// and returns the smaller one.
#[must_use]
pub fn bounding_sphere(positions: &[f64]) -> BoundingSphere {
    let points: Vec<DVec3> = positions.chunks_exact(3).map(DVec3::from_slice).collect();
    let Some(&first) = points.first() else {
        return BoundingSphere {
            center: DVec3::ZERO,
            radius: 0.0,
        };
    };

    // Extreme points along each axis.
    let mut min_points = [first; 3];
    let mut max_points = [first; 3];
    let mut box_min = first;
    let mut box_max = first;

    for &p in &points[1..] {
        for axis in 0..3 {
            if p[axis] < min_points[axis][axis] {
                min_points[axis] = p;
            }
            if p[axis] > max_points[axis][axis] {
                max_points[axis] = p;
            }
        }
        box_min = box_min.min(p);
        box_max = box_max.max(p);
    }

    let (mut diameter_min, mut diameter_max) = (min_points[0], max_points[0]);
    for axis in 1..3 {
        if min_points[axis].distance_squared(max_points[axis])
            > diameter_min.distance_squared(diameter_max)
        {
            diameter_min = min_points[axis];
            diameter_max = max_points[axis];
        }
    }

    let mut ritter_center = (diameter_min + diameter_max) * 0.5;
    let mut ritter_radius = diameter_max.distance(ritter_center);

    let box_center = (box_min + box_max) * 0.5;
    let mut box_radius: f64 = 0.0;

    for &p in &points {
        box_radius = box_radius.max(p.distance(box_center));

        let to_point = p.distance(ritter_center);
        if to_point > ritter_radius {
            ritter_radius = (ritter_radius + to_point) * 0.5;
            let shift = to_point - ritter_radius;
            ritter_center = (ritter_center * ritter_radius + p * shift) / to_point;
        }
    }

    if ritter_radius < box_radius {
        BoundingSphere {
            center: ritter_center,
            radius: ritter_radius,
        }
    } else {
        BoundingSphere {
            center: box_center,
            radius: box_radius,
        }
    }
}
