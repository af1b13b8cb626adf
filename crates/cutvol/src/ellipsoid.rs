//! Geodetic coordinate utilities.
//!
//! Provides conversions between Cartesian (Earth-Centered, Earth-Fixed)
//! coordinates and geographic coordinates (longitude, latitude, height) on a
//! reference ellipsoid, plus the local east-north-up frame used to place
//! meshes.

use glam::{DMat4, DVec3, DVec4};
use serde::{Deserialize, Serialize};

/// Convergence tolerance for the surface projection's Newton iteration.
const SURFACE_EPSILON: f64 = 1e-12;

/// Squared (normalised) distance from the centre below which the surface
/// projection falls back to a radial projection.
const CENTER_TOLERANCE_SQUARED: f64 = 0.1;

/// Tolerance for detecting positions on the polar axis.
const POLAR_EPSILON: f64 = 1e-14;

/// A reference ellipsoid, given by its three radii in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    radii: DVec3,
}

impl Ellipsoid {
    /// The WGS84 ellipsoid.
    pub const WGS84: Ellipsoid = Ellipsoid::new(DVec3::new(
        6_378_137.0,
        6_378_137.0,
        6_356_752.314_245_179_5,
    ));

    /// Create an ellipsoid from its radii.
    #[must_use]
    pub const fn new(radii: DVec3) -> Self {
        Self { radii }
    }

    fn radii_squared(&self) -> DVec3 {
        self.radii * self.radii
    }

    fn one_over_radii_squared(&self) -> DVec3 {
        DVec3::ONE / self.radii_squared()
    }

    /// Unit normal of the ellipsoid surface through `position`.
    ///
    /// Returns `None` for the ellipsoid centre.
    #[must_use]
    pub fn geodetic_surface_normal(&self, position: DVec3) -> Option<DVec3> {
        (position * self.one_over_radii_squared()).try_normalize()
    }

    /// Unit surface normal at a geographic position.
    #[must_use]
    pub fn geodetic_surface_normal_cartographic(&self, cartographic: Cartographic) -> DVec3 {
        let cos_lat = cartographic.latitude.cos();
        DVec3::new(
            cos_lat * cartographic.longitude.cos(),
            cos_lat * cartographic.longitude.sin(),
            cartographic.latitude.sin(),
        )
        .normalize()
    }

    /// Convert geographic coordinates to a Cartesian position.
    #[must_use]
    pub fn cartographic_to_cartesian(&self, cartographic: Cartographic) -> DVec3 {
        let n = self.geodetic_surface_normal_cartographic(cartographic);
        let k = self.radii_squared() * n;
        let gamma = n.dot(k).sqrt();
        k / gamma + n * cartographic.height
    }

    /// Convert a Cartesian position to geographic coordinates.
    ///
    /// Returns `None` for positions at the ellipsoid centre, which have no
    /// geodetic form.
    #[must_use]
    pub fn cartesian_to_cartographic(&self, position: DVec3) -> Option<Cartographic> {
        let surface = self.scale_to_geodetic_surface(position)?;
        let n = self.geodetic_surface_normal(surface)?;
        let h = position - surface;

        let longitude = n.y.atan2(n.x);
        let latitude = n.z.clamp(-1.0, 1.0).asin();
        let height = signum_or_zero(h.dot(position)) * h.length();

        Some(Cartographic {
            longitude,
            latitude,
            height,
        })
    }

    /// Project a position along the surface normal onto the ellipsoid surface.
    ///
    /// Solves for the surface point with a Newton iteration. Returns `None`
    /// for the ellipsoid centre.
    #[must_use]
    pub fn scale_to_geodetic_surface(&self, position: DVec3) -> Option<DVec3> {
        let one_over_radii = DVec3::ONE / self.radii;
        let scaled = position * one_over_radii;
        let squared = scaled * scaled;

        let squared_norm = squared.element_sum();
        let ratio = (1.0 / squared_norm).sqrt();
        let intersection = position * ratio;

        if squared_norm < CENTER_TOLERANCE_SQUARED {
            return intersection.is_finite().then_some(intersection);
        }

        let one_over_radii_squared = self.one_over_radii_squared();
        let gradient = intersection * one_over_radii_squared * 2.0;

        let mut lambda = (1.0 - ratio) * position.length() / (0.5 * gradient.length());
        let mut correction = 0.0;
        let mut multiplier;

        loop {
            lambda -= correction;

            multiplier = DVec3::ONE / (DVec3::ONE + one_over_radii_squared * lambda);
            let multiplier2 = multiplier * multiplier;
            let multiplier3 = multiplier2 * multiplier;

            let func = (squared * multiplier2).element_sum() - 1.0;
            let denominator = (squared * multiplier3 * one_over_radii_squared).element_sum();
            let derivative = -2.0 * denominator;

            correction = func / derivative;

            if func.abs() <= SURFACE_EPSILON || !func.is_finite() {
                break;
            }
        }

        let result = position * multiplier;
        result.is_finite().then_some(result)
    }

    /// The local east-north-up frame at `origin`, as a local-to-fixed transform.
    ///
    /// Columns are east, north, up and the origin itself. Positions on the
    /// polar axis get a fixed frame, since east is undefined there.
    #[must_use]
    pub fn east_north_up_to_fixed_frame(&self, origin: DVec3) -> DMat4 {
        let (east, north, up) = if origin.x.abs() < POLAR_EPSILON && origin.y.abs() < POLAR_EPSILON
        {
            let sign = signum_or_zero(origin.z);
            (
                DVec3::Y,
                DVec3::new(-1.0, 0.0, 0.0) * sign,
                DVec3::Z * sign,
            )
        } else {
            let up = self.geodetic_surface_normal(origin).unwrap_or(DVec3::Z);
            let east = DVec3::new(-origin.y, origin.x, 0.0).normalize();
            let north = up.cross(east);
            (east, north, up)
        };

        DMat4::from_cols(
            east.extend(0.0),
            north.extend(0.0),
            up.extend(0.0),
            DVec4::new(origin.x, origin.y, origin.z, 1.0),
        )
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::WGS84
    }
}

/// Sign of `value`, with zero mapping to zero.
fn signum_or_zero(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// A geographic position: longitude and latitude in radians, height in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cartographic {
    /// Longitude in radians.
    pub longitude: f64,
    /// Latitude in radians.
    pub latitude: f64,
    /// Height above the ellipsoid in metres.
    pub height: f64,
}

impl Cartographic {
    /// Create a cartographic position from radians.
    #[must_use]
    pub fn new(longitude: f64, latitude: f64, height: f64) -> Self {
        Self {
            longitude,
            latitude,
            height,
        }
    }

    /// Create a cartographic position from degrees.
    #[must_use]
    pub fn from_degrees(longitude_deg: f64, latitude_deg: f64, height: f64) -> Self {
        Self::new(longitude_deg.to_radians(), latitude_deg.to_radians(), height)
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn longitude_degrees(&self) -> f64 {
        self.longitude.to_degrees()
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn latitude_degrees(&self) -> f64 {
        self.latitude.to_degrees()
    }

    /// The same longitude and latitude at a different height.
    #[must_use]
    pub fn with_height(self, height: f64) -> Self {
        Self { height, ..self }
    }
}

/// A point on or near the ellipsoid.
///
/// Holds both the Cartesian position and its geographic form, which are kept
/// consistent for the ellipsoid the point was built with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    position: DVec3,
    cartographic: Cartographic,
}

impl SurfacePoint {
    /// Build a point from geographic coordinates.
    #[must_use]
    pub fn from_cartographic(ellipsoid: &Ellipsoid, cartographic: Cartographic) -> Self {
        Self {
            position: ellipsoid.cartographic_to_cartesian(cartographic),
            cartographic,
        }
    }

    /// Build a point from a Cartesian position.
    ///
    /// Returns `None` for positions with no geodetic form.
    #[must_use]
    pub fn from_position(ellipsoid: &Ellipsoid, position: DVec3) -> Option<Self> {
        let cartographic = ellipsoid.cartesian_to_cartographic(position)?;
        Some(Self {
            position,
            cartographic,
        })
    }

    /// The Cartesian position in metres.
    #[must_use]
    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// The geographic form of this point.
    #[must_use]
    pub fn cartographic(&self) -> Cartographic {
        self.cartographic
    }

    /// Height above the ellipsoid in metres.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.cartographic.height
    }

    /// The point with the same footprint at a different height.
    #[must_use]
    pub fn with_height(&self, ellipsoid: &Ellipsoid, height: f64) -> Self {
        Self::from_cartographic(ellipsoid, self.cartographic.with_height(height))
    }

    /// Cartesian position of this point's footprint at `height`.
    #[must_use]
    pub fn position_at_height(&self, ellipsoid: &Ellipsoid, height: f64) -> DVec3 {
        ellipsoid.cartographic_to_cartesian(self.cartographic.with_height(height))
    }

    /// Straight-line distance to another point in metres.
    #[must_use]
    pub fn distance(&self, other: &SurfacePoint) -> f64 {
        self.position.distance(other.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_wgs84() {
        let ellipsoid = Ellipsoid::WGS84;
        for &(lon, lat, height) in &[
            (0.0, 0.0, 0.0),
            (-74.0, 40.7, 125.0),
            (139.7, 35.7, -30.0),
            (12.5, -89.0, 4000.0),
            (179.9, 0.5, 8848.0),
        ] {
            let cartographic = Cartographic::from_degrees(lon, lat, height);
            let position = ellipsoid.cartographic_to_cartesian(cartographic);
            let back = ellipsoid.cartesian_to_cartographic(position).unwrap();

            assert!((back.longitude - cartographic.longitude).abs() < 1e-12);
            assert!((back.latitude - cartographic.latitude).abs() < 1e-12);
            assert!(
                (back.height - height).abs() < 1e-6,
                "height mismatch at ({lon}, {lat}): {} vs {height}",
                back.height
            );
        }
    }

    #[test]
    fn test_equator_position() {
        let ellipsoid = Ellipsoid::WGS84;
        let position = ellipsoid.cartographic_to_cartesian(Cartographic::from_degrees(0.0, 0.0, 10.0));
        assert!((position.x - (6_378_137.0 + 10.0)).abs() < 1e-6);
        assert!(position.y.abs() < 1e-6);
        assert!(position.z.abs() < 1e-6);
    }

    #[test]
    fn test_centre_has_no_cartographic() {
        assert!(Ellipsoid::WGS84.cartesian_to_cartographic(DVec3::ZERO).is_none());
        assert!(SurfacePoint::from_position(&Ellipsoid::WGS84, DVec3::ZERO).is_none());
    }

    #[test]
    fn test_scale_to_surface_keeps_footprint() {
        let ellipsoid = Ellipsoid::WGS84;
        let cartographic = Cartographic::from_degrees(10.0, 45.0, 2500.0);
        let position = ellipsoid.cartographic_to_cartesian(cartographic);
        let surface = ellipsoid.scale_to_geodetic_surface(position).unwrap();
        let surface_carto = ellipsoid.cartesian_to_cartographic(surface).unwrap();

        assert!(surface_carto.height.abs() < 1e-6);
        assert!((surface_carto.longitude - cartographic.longitude).abs() < 1e-12);
        assert!((surface_carto.latitude - cartographic.latitude).abs() < 1e-12);
    }

    #[test]
    fn test_surface_point_with_height() {
        let ellipsoid = Ellipsoid::WGS84;
        let point = SurfacePoint::from_cartographic(
            &ellipsoid,
            Cartographic::from_degrees(5.0, 50.0, 0.0),
        );
        let raised = point.with_height(&ellipsoid, 100.0);

        assert!((raised.height() - 100.0).abs() < 1e-9);
        assert!((point.distance(&raised) - 100.0).abs() < 1e-6);
        assert_eq!(
            raised.cartographic().longitude,
            point.cartographic().longitude
        );
    }

    #[test]
    fn test_enu_frame_is_orthonormal() {
        let ellipsoid = Ellipsoid::WGS84;
        let origin = ellipsoid.cartographic_to_cartesian(Cartographic::from_degrees(30.0, 60.0, 0.0));
        let frame = ellipsoid.east_north_up_to_fixed_frame(origin);

        let east = frame.x_axis.truncate();
        let north = frame.y_axis.truncate();
        let up = frame.z_axis.truncate();

        assert!((east.length() - 1.0).abs() < 1e-12);
        assert!((north.length() - 1.0).abs() < 1e-12);
        assert!((up.length() - 1.0).abs() < 1e-12);
        assert!(east.dot(north).abs() < 1e-12);
        assert!(east.dot(up).abs() < 1e-12);
        assert!(north.dot(up).abs() < 1e-12);
        // North points towards increasing latitude.
        assert!(north.z > 0.0);
        assert_eq!(frame.w_axis.truncate(), origin);
    }

    #[test]
    fn test_enu_frame_at_pole() {
        let frame = Ellipsoid::WGS84.east_north_up_to_fixed_frame(DVec3::new(0.0, 0.0, 6_356_752.0));
        assert_eq!(frame.z_axis.truncate(), DVec3::Z);
        assert_eq!(frame.x_axis.truncate(), DVec3::Y);
    }
}
