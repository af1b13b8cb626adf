//! Measurement configuration.

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::ellipsoid::Ellipsoid;
use crate::sampler::DEFAULT_DIVISIONS;

/// Default detail level.
pub const DEFAULT_DETAIL_LEVEL: u32 = 1;
/// Lowest accepted detail level.
pub const MIN_DETAIL_LEVEL: u32 = 1;
/// Highest accepted detail level.
pub const MAX_DETAIL_LEVEL: u32 = 16;
/// Default display lift of the fill mesh and wireframe, in metres.
pub const DEFAULT_VERTICAL_OFFSET: f64 = 100.0;
/// Default height of the volume label above the highest sampled point, in metres.
pub const DEFAULT_LABEL_HEIGHT_OFFSET: f64 = 1000.0;

/// Opaque blue.
pub const BLUE: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);
/// Opaque red.
pub const RED: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
/// Opaque white.
pub const WHITE: Vec4 = Vec4::new(1.0, 1.0, 1.0, 1.0);

/// Vertex colours used by the mesh builder, as linear RGBA in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillPalette {
    /// Top colour at the floor height.
    pub low: Vec4,
    /// Top colour at the maximum height.
    pub high: Vec4,
    /// Colour of the bottom vertices.
    pub floor: Vec4,
    /// Colour of the wireframe.
    pub wireframe: Vec4,
}

impl Default for FillPalette {
    fn default() -> Self {
        Self {
            low: BLUE,
            high: RED,
            floor: BLUE,
            wireframe: WHITE,
        }
    }
}

impl FillPalette {
    /// Top colour for a height ratio, clamped to `0..=1`.
    #[must_use]
    pub fn top_color(&self, ratio: f64) -> Vec4 {
        #[allow(clippy::cast_possible_truncation)]
        let t = ratio.clamp(0.0, 1.0) as f32;
        self.low.lerp(self.high, t)
    }
}

/// Convert a float colour to RGBA bytes.
///
/// `1.0` maps to 255; other components map to `floor(c * 256)`.
#[must_use]
pub fn color_to_bytes(color: Vec4) -> [u8; 4] {
    color.to_array().map(|c| {
        if c >= 1.0 {
            255
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let byte = (c.max(0.0) * 256.0).floor() as u8;
            byte
        }
    })
}

/// Settings for a measurement session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Subdivision detail level, `MIN_DETAIL_LEVEL..=MAX_DETAIL_LEVEL`.
    pub detail_level: u32,
    /// Display lift applied to both meshes, in metres.
    pub vertical_offset: f64,
    /// Number of sequential elevation batches per sampling pass.
    pub batch_divisions: usize,
    /// Label height above the highest sampled point, in metres.
    pub label_height_offset: f64,
    /// Reference ellipsoid.
    pub ellipsoid: Ellipsoid,
    /// Mesh colours.
    pub palette: FillPalette,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            detail_level: DEFAULT_DETAIL_LEVEL,
            vertical_offset: DEFAULT_VERTICAL_OFFSET,
            batch_divisions: DEFAULT_DIVISIONS,
            label_height_offset: DEFAULT_LABEL_HEIGHT_OFFSET,
            ellipsoid: Ellipsoid::WGS84,
            palette: FillPalette::default(),
        }
    }
}

impl MeasureConfig {
    /// Clamp a detail level into the accepted range, logging when it changes.
    #[must_use]
    pub fn clamp_detail_level(level: u32) -> u32 {
        let clamped = level.clamp(MIN_DETAIL_LEVEL, MAX_DETAIL_LEVEL);
        if clamped != level {
            tracing::warn!(requested = level, used = clamped, "detail level out of range");
        }
        clamped
    }

    /// Return a copy with the detail level clamped and batch divisions at least one.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.detail_level = Self::clamp_detail_level(self.detail_level);
        self.batch_divisions = self.batch_divisions.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_to_bytes() {
        assert_eq!(color_to_bytes(BLUE), [0, 0, 255, 255]);
        assert_eq!(color_to_bytes(Vec4::new(0.5, 0.25, 0.0, 1.0)), [128, 64, 0, 255]);
        assert_eq!(color_to_bytes(Vec4::new(-0.5, 2.0, 0.999, 1.0)), [0, 255, 255, 255]);
    }

    #[test]
    fn test_top_color_clamps_ratio() {
        let palette = FillPalette::default();
        assert_eq!(palette.top_color(-1.0), BLUE);
        assert_eq!(palette.top_color(0.0), BLUE);
        assert_eq!(palette.top_color(1.0), RED);
        assert_eq!(palette.top_color(7.0), RED);
        assert_eq!(palette.top_color(0.5), Vec4::new(0.5, 0.0, 0.5, 1.0));
    }

    #[test]
    fn test_detail_level_clamped() {
        assert_eq!(MeasureConfig::clamp_detail_level(0), MIN_DETAIL_LEVEL);
        assert_eq!(MeasureConfig::clamp_detail_level(5), 5);
        assert_eq!(MeasureConfig::clamp_detail_level(99), MAX_DETAIL_LEVEL);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MeasureConfig =
            serde_json::from_str(r#"{"detail_level": 3, "vertical_offset": -12.5}"#).unwrap();
        assert_eq!(config.detail_level, 3);
        assert!((config.vertical_offset + 12.5).abs() < f64::EPSILON);
        assert_eq!(config.batch_divisions, DEFAULT_DIVISIONS);
        assert_eq!(config.ellipsoid, Ellipsoid::WGS84);
        assert_eq!(config.palette, FillPalette::default());

        let empty: MeasureConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, MeasureConfig::default());
    }

    #[test]
    fn test_normalized_repairs_out_of_range_values() {
        let config = MeasureConfig {
            detail_level: 0,
            batch_divisions: 0,
            ..MeasureConfig::default()
        }
        .normalized();
        assert_eq!(config.detail_level, MIN_DETAIL_LEVEL);
        assert_eq!(config.batch_divisions, 1);
        assert!((config.vertical_offset - DEFAULT_VERTICAL_OFFSET).abs() < f64::EPSILON);
    }
}
