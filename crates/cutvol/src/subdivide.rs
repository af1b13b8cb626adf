//! Polygon triangulation and subdivision.
//!
//! The polygon is projected onto the tangent plane at its centre, triangulated
//! by ear clipping, and then refined on the ellipsoid until no triangle edge
//! spans more than the requested angle. The resulting vertices sit at height
//! zero; terrain heights are resolved later by the sampler.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::f64::consts::PI;

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{Area, Coord, Line, LineString, TriangulateEarcut};
use glam::DVec3;

use crate::ellipsoid::{Ellipsoid, SurfacePoint};
use crate::error::{Error, Result};
use crate::polygon::Polygon;
use crate::types::Triangle;

/// Smallest accepted ratio of planar area to squared perimeter.
const MIN_AREA_RATIO: f64 = 1e-10;

/// Largest dense mesh a polygon may be subdivided into.
pub const MAX_TRIANGLES: usize = 4_000_000;

/// Subdivision granularity for a detail level.
///
/// `max_level` is the finest terrain tile level available under the polygon;
/// each additional detail level halves the maximum edge angle.
#[must_use]
pub fn granularity_for(max_level: u32, detail_level: u32) -> f64 {
    let exponent = i32::try_from(max_level.saturating_add(detail_level)).unwrap_or(i32::MAX);
    PI / 2f64.powi(exponent)
}

/// Angle between two vectors, stable for very small angles.
fn angle_between(a: DVec3, b: DVec3) -> f64 {
    a.cross(b).length().atan2(a.dot(b))
}

/// Splits a polygon into a dense triangle mesh on the ellipsoid.
#[derive(Debug, Clone, Copy)]
pub struct PolygonSubdivider {
    ellipsoid: Ellipsoid,
    max_triangles: usize,
}

impl Default for PolygonSubdivider {
    fn default() -> Self {
        Self::new(Ellipsoid::default())
    }
}

impl PolygonSubdivider {
    /// Create a subdivider for the given ellipsoid.
    #[must_use]
    pub fn new(ellipsoid: Ellipsoid) -> Self {
        Self {
            ellipsoid,
            max_triangles: MAX_TRIANGLES,
        }
    }

    /// Lower the triangle ceiling. Values above [`MAX_TRIANGLES`] are capped.
    #[must_use]
    pub fn with_max_triangles(mut self, max_triangles: usize) -> Self {
        self.max_triangles = max_triangles.min(MAX_TRIANGLES);
        self
    }

    /// Triangulate the polygon interior and refine it so that no triangle edge
    /// exceeds `granularity` radians.
    ///
    /// Triangles are returned at height zero in a stable order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolygon`] for zero-area or self-intersecting
    /// polygons, polygons spanning a hemisphere or more, non-positive
    /// granularity, and meshes that would exceed the triangle ceiling.
    pub fn subdivide(&self, polygon: &Polygon, granularity: f64) -> Result<Vec<Triangle>> {
        if !(granularity.is_finite() && granularity > 0.0) {
            return Err(Error::invalid_polygon(format!(
                "granularity must be positive, got {granularity}"
            )));
        }

        let corners: Vec<DVec3> = polygon
            .points()
            .iter()
            .map(|p| p.position_at_height(&self.ellipsoid, 0.0))
            .collect();

        let planar = self.project_to_tangent_plane(&corners)?;
        validate_planar(&planar)?;

        let mut positions = corners;
        let seeds = triangulate(&planar);

        tracing::debug!(
            corners = positions.len(),
            seeds = seeds.len(),
            granularity,
            "triangulated polygon"
        );

        let faces = refine(&mut positions, seeds, granularity, self.max_triangles)
            .ok_or_else(|| {
                Error::invalid_polygon(format!(
                    "subdivision would exceed {} triangles; lower the detail level",
                    self.max_triangles
                ))
            })?;

        let vertices = positions
            .iter()
            .map(|&p| {
                self.ellipsoid
                    .cartesian_to_cartographic(p)
                    .map(|c| SurfacePoint::from_cartographic(&self.ellipsoid, c.with_height(0.0)))
                    .ok_or_else(|| Error::invalid_polygon("subdivided vertex has no geodetic form"))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            vertices = vertices.len(),
            triangles = faces.len(),
            "subdivided polygon"
        );

        Ok(faces
            .into_iter()
            .map(|[a, b, c]| Triangle([vertices[a], vertices[b], vertices[c]]))
            .collect())
    }

    /// Gnomonic projection onto the plane tangent to the ellipsoid below the
    /// corners' mean position.
    fn project_to_tangent_plane(&self, corners: &[DVec3]) -> Result<Vec<Coord<f64>>> {
        #[allow(clippy::cast_precision_loss)]
        let mean = corners.iter().copied().sum::<DVec3>() / corners.len() as f64;
        let origin = self
            .ellipsoid
            .scale_to_geodetic_surface(mean)
            .ok_or_else(|| Error::invalid_polygon("polygon is centred on the ellipsoid centre"))?;

        let frame = self.ellipsoid.east_north_up_to_fixed_frame(origin);
        let east = frame.x_axis.truncate();
        let north = frame.y_axis.truncate();
        let up = frame.z_axis.truncate();
        let plane_distance = origin.dot(up);

        corners
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let denominator = p.dot(up);
                if denominator <= 0.0 {
                    return Err(Error::invalid_polygon(format!(
                        "corner {i} lies a hemisphere or more away from the polygon centre"
                    )));
                }
                let offset = p * (plane_distance / denominator) - origin;
                Ok(Coord {
                    x: offset.dot(east),
                    y: offset.dot(north),
                })
            })
            .collect()
    }
}

/// Reject planar rings with no area or crossing edges.
fn validate_planar(ring: &[Coord<f64>]) -> Result<()> {
    let n = ring.len();
    let polygon = geo::Polygon::new(LineString::from(ring.to_vec()), vec![]);

    let perimeter: f64 = (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            (b.x - a.x).hypot(b.y - a.y)
        })
        .sum();
    if polygon.signed_area().abs() <= MIN_AREA_RATIO * perimeter * perimeter {
        return Err(Error::invalid_polygon("polygon has zero area"));
    }

    let edge = |i: usize| Line::new(ring[i], ring[(i + 1) % n]);
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edge(i), edge(j)) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => {
                    return Err(Error::invalid_polygon(format!(
                        "polygon edges {i} and {j} intersect"
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Ear-clip the planar ring, returning counter-clockwise corner index triples.
fn triangulate(ring: &[Coord<f64>]) -> Vec<[usize; 3]> {
    let n = ring.len();
    let polygon = geo::Polygon::new(LineString::from(ring.to_vec()), vec![]);
    let raw = polygon.earcut_triangles_raw();

    raw.triangle_indices
        .chunks_exact(3)
        .map(|t| {
            let (a, b, c) = (t[0] % n, t[1] % n, t[2] % n);
            let (pa, pb, pc) = (ring[a], ring[b], ring[c]);
            let cross = (pb.x - pa.x) * (pc.y - pa.y) - (pb.y - pa.y) * (pc.x - pa.x);
            if cross < 0.0 { [a, c, b] } else { [a, b, c] }
        })
        .collect()
}

/// The edge of `face` with the largest angle, as `(k, angle)` for the edge
/// from `face[k]` to `face[(k + 1) % 3]`.
///
/// Equal angles are broken by the edge's position, so the choice does not
/// depend on how the face's vertices are labelled.
fn longest_edge(positions: &[DVec3], face: [usize; 3]) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    let mut best_sum = [f64::NEG_INFINITY; 3];

    for k in 0..3 {
        let (a, b) = (positions[face[k]], positions[face[(k + 1) % 3]]);
        let angle = angle_between(a, b);
        let sum = (a + b).to_array();
        let wins = match angle.total_cmp(&best.1) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => sum.partial_cmp(&best_sum) == Some(Ordering::Greater),
        };
        if wins {
            best = (k, angle);
            best_sum = sum;
        }
    }

    best
}

/// Split triangles until every edge angle is within `granularity`.
///
/// Shared edges are split once through a midpoint table so neighbouring
/// triangles stay connected. New vertices are appended to `positions`.
/// Returns `None` once more than `max_triangles` faces would be produced.
fn refine(
    positions: &mut Vec<DVec3>,
    seeds: Vec<[usize; 3]>,
    granularity: f64,
    max_triangles: usize,
) -> Option<Vec<[usize; 3]>> {
    let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
    let mut stack: Vec<[usize; 3]> = seeds.into_iter().rev().collect();
    let mut faces = Vec::new();

    let mut midpoint = |positions: &mut Vec<DVec3>, a: usize, b: usize| -> usize {
        let key = (a.min(b), a.max(b));
        *midpoints.entry(key).or_insert_with(|| {
            let mid = (positions[a] + positions[b]) * 0.5;
            positions.push(mid);
            positions.len() - 1
        })
    };

    while let Some(face) = stack.pop() {
        let (k, max) = longest_edge(positions, face);

        if max <= granularity {
            faces.push(face);
            continue;
        }

        if faces.len() + stack.len() + 2 > max_triangles {
            return None;
        }

        // Push the second half first so the first half is refined next.
        let (a, b, c) = (face[k], face[(k + 1) % 3], face[(k + 2) % 3]);
        let m = midpoint(positions, a, b);
        stack.push([m, b, c]);
        stack.push([a, m, c]);
    }

    Some(faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ellipsoid::Cartographic;
    use proptest::prelude::*;

    fn polygon(degrees: &[(f64, f64)]) -> Polygon {
        let corners: Vec<Cartographic> = degrees
            .iter()
            .map(|&(lon, lat)| Cartographic::from_degrees(lon, lat, 0.0))
            .collect();
        Polygon::from_cartographics(&Ellipsoid::WGS84, &corners).unwrap()
    }

    fn square(lon: f64, lat: f64, size: f64) -> Polygon {
        polygon(&[
            (lon, lat),
            (lon + size, lat),
            (lon + size, lat + size),
            (lon, lat + size),
        ])
    }

    fn total_area(triangles: &[Triangle]) -> f64 {
        triangles
            .iter()
            .map(|t| t.footprint_area(&Ellipsoid::WGS84))
            .sum()
    }

    #[test]
    fn test_granularity_for() {
        assert!((granularity_for(0, 1) - PI / 2.0).abs() < 1e-15);
        assert!((granularity_for(12, 3) - PI / 32768.0).abs() < 1e-18);
    }

    #[test]
    fn test_coarse_granularity_keeps_ear_triangles() {
        let subdivider = PolygonSubdivider::default();
        let triangles = subdivider.subdivide(&square(0.0, 10.0, 0.02), 1.0).unwrap();
        assert_eq!(triangles.len(), 2);
        for t in &triangles {
            for v in t.vertices() {
                assert!(v.height().abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_edges_within_granularity() {
        let granularity = granularity_for(15, 0);
        let triangles = PolygonSubdivider::default()
            .subdivide(&square(0.0, 10.0, 0.02), granularity)
            .unwrap();

        assert!(triangles.len() > 2);
        for t in &triangles {
            let [a, b, c] = t.vertices().map(|v| v.position());
            for (p, q) in [(a, b), (b, c), (c, a)] {
                assert!(angle_between(p, q) <= granularity * 1.001);
            }
        }
    }

    #[test]
    fn test_triangles_wind_outward() {
        let triangles = PolygonSubdivider::default()
            .subdivide(&square(-74.0, 40.7, 0.01), granularity_for(14, 1))
            .unwrap();
        for t in &triangles {
            let [a, b, c] = t.vertices().map(|v| v.position());
            let normal = (b - a).cross(c - a);
            assert!(normal.dot(a) > 0.0);
        }
    }

    #[test]
    fn test_area_preserved_across_detail_levels() {
        let subdivider = PolygonSubdivider::default();
        let shape = polygon(&[(0.0, 10.0), (0.03, 10.0), (0.02, 10.02), (0.0, 10.01)]);

        let coarse = total_area(&subdivider.subdivide(&shape, 1.0).unwrap());
        let fine = total_area(&subdivider.subdivide(&shape, granularity_for(14, 2)).unwrap());

        assert!(((coarse - fine) / coarse).abs() < 1e-6);
    }

    #[test]
    fn test_concave_polygon() {
        let shape = polygon(&[
            (0.0, 0.0),
            (0.02, 0.0),
            (0.02, 0.02),
            (0.01, 0.005),
            (0.0, 0.02),
        ]);
        let triangles = PolygonSubdivider::default().subdivide(&shape, 1.0).unwrap();
        assert_eq!(triangles.len(), 3);
    }

    #[test]
    fn test_self_intersecting_rejected() {
        let bow_tie = polygon(&[(0.0, 0.0), (0.01, 0.01), (0.01, 0.0), (0.0, 0.01)]);
        let err = PolygonSubdivider::default()
            .subdivide(&bow_tie, 1.0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPolygon { .. }));
    }

    #[test]
    fn test_collinear_rejected() {
        let line = polygon(&[(0.0, 0.0), (0.01, 0.0), (0.02, 0.0)]);
        let err = PolygonSubdivider::default().subdivide(&line, 1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidPolygon { .. }));
    }

    #[test]
    fn test_invalid_granularity_rejected() {
        let err = PolygonSubdivider::default()
            .subdivide(&square(0.0, 0.0, 0.01), 0.0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPolygon { .. }));
    }

    #[test]
    fn test_winding_does_not_change_count() {
        let subdivider = PolygonSubdivider::default();
        let granularity = granularity_for(15, 0);
        let ccw = polygon(&[(0.0, 10.0), (0.02, 10.0), (0.02, 10.02), (0.0, 10.02)]);
        let cw = polygon(&[(0.0, 10.02), (0.02, 10.02), (0.02, 10.0), (0.0, 10.0)]);

        assert_eq!(
            subdivider.subdivide(&ccw, granularity).unwrap().len(),
            subdivider.subdivide(&cw, granularity).unwrap().len()
        );
    }

    #[test]
    fn test_output_is_deterministic() {
        let subdivider = PolygonSubdivider::default();
        let shape = square(8.0, 47.0, 0.015);
        let a = subdivider.subdivide(&shape, granularity_for(14, 2)).unwrap();
        let b = subdivider.subdivide(&shape, granularity_for(14, 2)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_triangle_ceiling() {
        let shape = square(0.0, 10.0, 0.02);
        let subdivider = PolygonSubdivider::default();
        let granularity = granularity_for(15, 2);
        let count = subdivider.subdivide(&shape, granularity).unwrap().len();

        let capped = subdivider.with_max_triangles(count - 1);
        let err = capped.subdivide(&shape, granularity).unwrap_err();
        assert!(matches!(err, Error::InvalidPolygon { .. }));

        let exact = subdivider.with_max_triangles(count);
        assert_eq!(exact.subdivide(&shape, granularity).unwrap().len(), count);
    }

    #[test]
    fn test_longest_edge_tie_ignores_labelling() {
        let r = 6_378_137.0;
        let positions = [DVec3::X * r, DVec3::Y * r, DVec3::Z * r];
        let edges: Vec<(usize, usize)> = [[0, 1, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]]
            .into_iter()
            .map(|face| {
                let (k, angle) = longest_edge(&positions, face);
                assert!((angle - PI / 2.0).abs() < 1e-15);
                let (a, b) = (face[k], face[(k + 1) % 3]);
                (a.min(b), a.max(b))
            })
            .collect();
        assert!(edges.iter().all(|&e| e == (0, 1)));
    }

    #[test]
    fn test_corner_order_does_not_change_count() {
        let subdivider = PolygonSubdivider::default();
        let granularity = granularity_for(15, 1);
        let corners = [(0.0, 10.0), (0.02, 10.0), (0.01, 10.017_320_5)];

        let counts: Vec<usize> = (0..3)
            .flat_map(|shift| {
                let mut order = corners.to_vec();
                order.rotate_left(shift);
                let forward = subdivider.subdivide(&polygon(&order), granularity).unwrap();
                order.reverse();
                let backward = subdivider.subdivide(&polygon(&order), granularity).unwrap();
                [forward.len(), backward.len()]
            })
            .collect();

        assert!(counts[0] > 1);
        assert!(counts.iter().all(|&n| n == counts[0]), "{counts:?}");
    }

    proptest! {
        #[test]
        fn test_count_invariant_under_longitude_shift(shift in -170.0f64..170.0) {
            let subdivider = PolygonSubdivider::default();
            let granularity = granularity_for(15, 0);
            let reference = subdivider.subdivide(&square(0.0, 10.0, 0.02), granularity).unwrap();
            let shifted = subdivider.subdivide(&square(shift, 10.0, 0.02), granularity).unwrap();
            prop_assert_eq!(reference.len(), shifted.len());
        }
    }
}
