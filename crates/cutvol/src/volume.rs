//! Prism-sum volume estimation.
//!
//! Each dense-mesh triangle is treated as a prism standing on its footprint
//! at height zero, cut by the floor plane at the minimum height. The volume
//! is the sum of footprint area times mean height above the floor.

use std::f64::consts::{PI, TAU};

use crate::ellipsoid::{Cartographic, Ellipsoid};
use crate::error::{Error, Result};
use crate::polygon::Polygon;
use crate::service::ElevationService;
use crate::types::{Triangle, VolumeResult};

/// Signed areas smaller than this fraction of the summed cross terms count as zero.
const DEGENERATE_AREA_RATIO: f64 = 1e-10;

/// The floor height for a polygon: the lowest cheap height estimate over its
/// corners.
///
/// Corners the service has no estimate for are skipped.
///
/// # Errors
///
/// Returns [`Error::ElevationQueryFailed`] if no corner has a height.
pub fn floor_height<S: ElevationService + ?Sized>(service: &S, polygon: &Polygon) -> Result<f64> {
    let mut floor: Option<f64> = None;
    for (index, corner) in polygon.cartographics().enumerate() {
        match service.height_at(&corner) {
            Some(height) if height.is_finite() => {
                floor = Some(floor.map_or(height, |f| f.min(height)));
            }
            _ => tracing::warn!(corner = index, "no height estimate for corner, skipping"),
        }
    }

    floor.ok_or_else(|| Error::elevation(None, "no height estimate for any polygon corner"))
}

/// Area-weighted centroid of a polygon in longitude/latitude space.
///
/// Longitudes are unwrapped relative to the first corner, so polygons that
/// cross the antimeridian are handled; the result longitude lies in
/// (-π, π]. The returned height is zero.
///
/// # Errors
///
/// Returns [`Error::DegenerateCentroid`] if the signed area is zero, and
/// [`Error::InvalidPolygon`] for fewer than three corners.
pub fn polygon_centroid(corners: &[Cartographic]) -> Result<Cartographic> {
    let Some(origin) = corners.first() else {
        return Err(Error::invalid_polygon("polygon has no corners"));
    };
    if corners.len() < 3 {
        return Err(Error::invalid_polygon("centroid needs at least three corners"));
    }

    let relative: Vec<(f64, f64)> = corners
        .iter()
        .map(|c| {
            let mut dx = c.longitude - origin.longitude;
            if dx > PI {
                dx -= TAU;
            } else if dx < -PI {
                dx += TAU;
            }
            (dx, c.latitude - origin.latitude)
        })
        .collect();

    let mut twice_area = 0.0;
    let mut magnitude = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;

    for (i, &(x0, y0)) in relative.iter().enumerate() {
        let (x1, y1) = relative[(i + 1) % relative.len()];
        let a = x0 * y1 - x1 * y0;
        twice_area += a;
        magnitude += (x0 * y1).abs() + (x1 * y0).abs();
        cx += (x0 + x1) * a;
        cy += (y0 + y1) * a;
    }

    if !twice_area.is_finite() || twice_area.abs() <= DEGENERATE_AREA_RATIO * magnitude {
        return Err(Error::DegenerateCentroid);
    }

    let denominator = 3.0 * twice_area;
    Ok(Cartographic::new(
        normalize_longitude(origin.longitude + cx / denominator),
        origin.latitude + cy / denominator,
        0.0,
    ))
}

/// Wrap a longitude into (-π, π].
fn normalize_longitude(longitude: f64) -> f64 {
    let wrapped = (longitude + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { PI } else { wrapped }
}

/// Integrates the cut volume over a sampled dense mesh.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeEstimator {
    ellipsoid: Ellipsoid,
}

impl VolumeEstimator {
    /// Create an estimator for the given ellipsoid.
    #[must_use]
    pub fn new(ellipsoid: Ellipsoid) -> Self {
        Self { ellipsoid }
    }

    /// Estimate the volume between the sampled triangles and `min_height`.
    ///
    /// Triangles dipping below the floor contribute negative volume. The
    /// centroid is taken from the original polygon corners.
    pub fn estimate(
        &self,
        polygon: &Polygon,
        triangles: &[Triangle],
        min_height: f64,
    ) -> Result<VolumeResult> {
        let corners: Vec<Cartographic> = polygon.cartographics().collect();
        let centroid = polygon_centroid(&corners)?;

        let mut volume = 0.0;
        let mut max_height = f64::NEG_INFINITY;

        for triangle in triangles {
            let [h1, h2, h3] = triangle.0.map(|v| v.height());
            max_height = max_height.max(h1).max(h2).max(h3);

            let area = triangle.footprint_area(&self.ellipsoid);
            volume += area * ((h1 + h2 + h3) / 3.0 - min_height);
        }

        if triangles.is_empty() {
            max_height = min_height;
        }

        tracing::info!(
            volume,
            min_height,
            max_height,
            triangles = triangles.len(),
            "estimated cut volume"
        );

        Ok(VolumeResult {
            volume,
            max_height,
            min_height,
            centroid,
            triangle_count: triangles.len(),
        })
    }
}
