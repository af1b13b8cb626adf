//! The frozen measurement polygon.

use glam::DVec3;

use crate::ellipsoid::{Cartographic, Ellipsoid, SurfacePoint};
use crate::error::{Error, Result};

/// Minimum number of distinct corners a measurable polygon needs.
pub const MIN_POINTS: usize = 3;

/// Positions closer than this (in metres) are treated as the same corner.
const DUPLICATE_TOLERANCE: f64 = 1e-7;

/// An ordered, implicitly closed polygon on the ellipsoid.
///
/// The last corner connects back to the first; no closing duplicate is
/// stored. Once built, a polygon is never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<SurfacePoint>,
}

impl Polygon {
    /// Build a polygon from Cartesian corner positions.
    ///
    /// Consecutive duplicates and a trailing copy of the first corner are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolygon`] if a corner has no geodetic form or
    /// fewer than three distinct corners remain.
    pub fn new(ellipsoid: &Ellipsoid, positions: &[DVec3]) -> Result<Self> {
        let points = positions
            .iter()
            .enumerate()
            .map(|(i, &position)| {
                SurfacePoint::from_position(ellipsoid, position).ok_or_else(|| {
                    Error::invalid_polygon(format!("corner {i} is at the ellipsoid centre"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_points(points)
    }

    /// Build a polygon from geographic corner positions.
    pub fn from_cartographics(ellipsoid: &Ellipsoid, corners: &[Cartographic]) -> Result<Self> {
        let points = corners
            .iter()
            .map(|&c| SurfacePoint::from_cartographic(ellipsoid, c))
            .collect();
        Self::from_points(points)
    }

    fn from_points(mut points: Vec<SurfacePoint>) -> Result<Self> {
        if points.iter().any(|p| !p.position().is_finite()) {
            return Err(Error::invalid_polygon("corner position is not finite"));
        }

        points.dedup_by(|b, a| a.position().distance(b.position()) < DUPLICATE_TOLERANCE);
        while points.len() > 1
            && points[0].position().distance(points[points.len() - 1].position())
                < DUPLICATE_TOLERANCE
        {
            points.pop();
        }

        if points.len() < MIN_POINTS {
            return Err(Error::invalid_polygon(format!(
                "need at least {MIN_POINTS} distinct points, got {}",
                points.len()
            )));
        }

        Ok(Self { points })
    }

    /// The polygon corners in order.
    #[must_use]
    pub fn points(&self) -> &[SurfacePoint] {
        &self.points
    }

    /// Number of corners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; a polygon has at least three corners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Geographic form of each corner.
    pub fn cartographics(&self) -> impl ExactSizeIterator<Item = Cartographic> + '_ {
        self.points.iter().map(SurfacePoint::cartographic)
    }
}
