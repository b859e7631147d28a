//! Built-in track shapes
//!
//! Each preset is a closed centerline centered on the world origin. Building
//! a preset paints that centerline into a fresh bitmap and records the
//! natural start pose: on the line, facing along the direction of travel.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

use super::{TrackMap, MAX_TRACK_PIXELS};
use crate::math::{Pose2, Vec2};
use crate::{Error, Result};

/// Blank border around the centerline (meters)
const MARGIN: f64 = 0.15;

/// Samples used to estimate curve length for shapes without a closed form
const LENGTH_SAMPLES: usize = 2048;

/// Built-in track shapes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum TrackPreset {
    /// Circle traveled counter-clockwise
    Circle {
        /// Radius in meters
        radius: f64,
    },
    /// Stadium: two straights joined by semicircles
    Oval {
        /// Length of each straight in meters
        straight: f64,
        /// Radius of the end turns in meters
        radius: f64,
    },
    /// Lemniscate of Gerono; the two lobes cross at right angles
    FigureEight {
        /// Half-width of the figure in meters
        size: f64,
    },
}

impl Default for TrackPreset {
    fn default() -> Self {
        Self::oval()
    }
}

impl TrackPreset {
    /// 0.5 m radius circle
    pub fn circle() -> Self {
        Self::Circle { radius: 0.5 }
    }

    /// 1 m straights with 0.4 m turns
    pub fn oval() -> Self {
        Self::Oval {
            straight: 1.0,
            radius: 0.4,
        }
    }

    /// 0.8 m half-width figure eight
    pub fn figure_eight() -> Self {
        Self::FigureEight { size: 0.8 }
    }

    /// Parse a preset name as used on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "circle" => Some(Self::circle()),
            "oval" => Some(Self::oval()),
            "figure-eight" | "figure_eight" | "eight" => Some(Self::figure_eight()),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        let ok = match *self {
            Self::Circle { radius } => radius > 0.0,
            Self::Oval { straight, radius } => straight >= 0.0 && radius > 0.0,
            Self::FigureEight { size } => size > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Track(format!("invalid preset dimensions: {:?}", self)))
        }
    }

    /// Half extents of the centerline's bounding box (x, y)
    pub fn half_extent(&self) -> (f64, f64) {
        match *self {
            Self::Circle { radius } => (radius, radius),
            Self::Oval { straight, radius } => (straight / 2.0 + radius, radius),
            Self::FigureEight { size } => (size, size / 2.0),
        }
    }

    /// Length of the closed centerline in meters
    pub fn length(&self) -> f64 {
        match *self {
            Self::Circle { radius } => TAU * radius,
            Self::Oval { straight, radius } => 2.0 * straight + TAU * radius,
            Self::FigureEight { .. } => {
                let mut prev = self.point_at(0.0);
                let mut total = 0.0;
                for i in 1..=LENGTH_SAMPLES {
                    let p = self.point_at(i as f64 / LENGTH_SAMPLES as f64);
                    total += (p - prev).norm();
                    prev = p;
                }
                total
            }
        }
    }

    /// Point on the centerline at fraction `s` of a lap (0.0-1.0)
    ///
    /// `s = 0` is the start pose's position.
    pub fn point_at(&self, s: f64) -> Vec2 {
        let s = s.rem_euclid(1.0);
        match *self {
            Self::Circle { radius } => {
                let a = TAU * s;
                Vec2::new(radius * a.cos(), radius * a.sin())
            }
            Self::FigureEight { size } => {
                let t = TAU * s;
                Vec2::new(size * t.cos(), size * t.sin() * t.cos())
            }
            Self::Oval { straight, radius } => {
                let half = straight / 2.0;
                let arc = PI * radius;
                let mut d = s * self.length();

                // Bottom straight, right half (heading +X)
                if d <= half {
                    return Vec2::new(d, -radius);
                }
                d -= half;
                // Right turn around (half, 0)
                if d <= arc {
                    let a = -FRAC_PI_2 + d / radius;
                    return Vec2::new(half + radius * a.cos(), radius * a.sin());
                }
                d -= arc;
                // Top straight (heading -X)
                if d <= straight {
                    return Vec2::new(half - d, radius);
                }
                d -= straight;
                // Left turn around (-half, 0)
                if d <= arc {
                    let a = FRAC_PI_2 + d / radius;
                    return Vec2::new(-half + radius * a.cos(), radius * a.sin());
                }
                d -= arc;
                // Bottom straight, left half
                Vec2::new(-half + d, -radius)
            }
        }
    }

    /// Closed centerline with segments no longer than `max_segment`
    pub fn centerline(&self, max_segment: f64) -> Vec<Vec2> {
        let max_segment = max_segment.max(1e-4);
        let n = ((self.length() / max_segment).ceil() as usize).max(16);
        (0..=n).map(|i| self.point_at(i as f64 / n as f64)).collect()
    }

    /// Start pose: on the line at `s = 0`, facing the direction of travel
    pub fn start_pose(&self) -> Pose2 {
        match *self {
            Self::Circle { radius } => Pose2::new(radius, 0.0, FRAC_PI_2),
            Self::Oval { radius, .. } => Pose2::new(0.0, -radius, 0.0),
            Self::FigureEight { size } => Pose2::new(size, 0.0, FRAC_PI_2),
        }
    }

    /// Paint the preset into a new bitmap
    ///
    /// # Arguments
    /// * `resolution` - Meters per pixel
    /// * `line_width` - Width of the painted line in meters
    pub fn build(&self, resolution: f64, line_width: f64) -> Result<TrackMap> {
        self.validate()?;
        if !(resolution > 0.0) {
            return Err(Error::Track(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }

        let (hw, hh) = self.half_extent();
        let width_m = 2.0 * (hw + MARGIN);
        let height_m = 2.0 * (hh + MARGIN);
        let width_f = (width_m / resolution).ceil();
        let height_f = (height_m / resolution).ceil();
        if !(width_f * height_f <= MAX_TRACK_PIXELS as f64) {
            return Err(Error::Track(format!(
                "resolution {} m/px needs a {:.0}x{:.0} px bitmap, over the {} pixel limit",
                resolution, width_f, height_f, MAX_TRACK_PIXELS
            )));
        }
        let width_px = width_f as u32;
        let height_px = height_f as u32;

        let mut track = TrackMap::blank(
            width_px,
            height_px,
            resolution,
            Vec2::new(-hw - MARGIN, -hh - MARGIN),
        )?;
        track.paint_stroke(&self.centerline(resolution * 4.0), line_width)?;
        track.set_start_pose(Some(self.start_pose()));

        tracing::debug!(
            "Built {:?} track: {}x{} px, centerline {:.2} m",
            self,
            width_px,
            height_px,
            self.length()
        );
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RES: f64 = 0.004;
    const WIDTH: f64 = 0.02;

    #[test]
    fn test_start_pose_lies_on_centerline() {
        for preset in [
            TrackPreset::circle(),
            TrackPreset::oval(),
            TrackPreset::figure_eight(),
        ] {
            let start = preset.start_pose();
            let p0 = preset.point_at(0.0);
            assert_relative_eq!(start.x, p0.x, epsilon = 1e-9);
            assert_relative_eq!(start.y, p0.y, epsilon = 1e-9);

            // Heading points toward the next sample
            let ahead = preset.point_at(0.001) - p0;
            assert!(ahead.normalize().dot(&start.heading()) > 0.99);
        }
    }

    #[test]
    fn test_oval_is_continuous() {
        let preset = TrackPreset::oval();
        let n = 1000;
        let step = preset.length() / n as f64;
        for i in 0..n {
            let a = preset.point_at(i as f64 / n as f64);
            let b = preset.point_at((i + 1) as f64 / n as f64);
            assert!((b - a).norm() <= step * 1.01, "gap at sample {}", i);
        }
    }

    #[test]
    fn test_lengths() {
        assert_relative_eq!(TrackPreset::circle().length(), TAU * 0.5);
        assert_relative_eq!(TrackPreset::oval().length(), 2.0 + TAU * 0.4);
        let eight = TrackPreset::figure_eight().length();
        assert!(eight > 4.0 * 0.8 && eight < 8.0 * 0.8);
    }

    #[test]
    fn test_build_paints_centerline() {
        let preset = TrackPreset::oval();
        let track = preset.build(RES, WIDTH).unwrap();

        for i in 0..50 {
            let p = preset.point_at(i as f64 / 50.0);
            assert!(track.is_line(p), "centerline point {} not painted", i);
        }
        // Middle of the oval is empty
        assert!(!track.is_line(Vec2::zeros()));
        assert_eq!(track.start_pose(), Some(preset.start_pose()));
    }

    #[test]
    fn test_figure_eight_crosses_at_origin() {
        let track = TrackPreset::figure_eight().build(RES, WIDTH).unwrap();
        assert!(track.is_line(Vec2::zeros()));
        assert!(track.is_line(Vec2::new(0.8, 0.0)));
        assert!(track.is_line(Vec2::new(-0.8, 0.0)));
    }

    #[test]
    fn test_invalid_presets() {
        assert!(TrackPreset::Circle { radius: 0.0 }.build(RES, WIDTH).is_err());
        assert!(TrackPreset::circle().build(0.0, WIDTH).is_err());
        assert!(TrackPreset::circle().build(RES, -1.0).is_err());
    }

    #[test]
    fn test_fine_resolution_is_rejected() {
        assert!(matches!(
            TrackPreset::oval().build(1e-9, WIDTH),
            Err(Error::Track(_))
        ));
        assert!(TrackPreset::oval().build(f64::MIN_POSITIVE, WIDTH).is_err());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(TrackPreset::from_name("circle"), Some(TrackPreset::circle()));
        assert_eq!(
            TrackPreset::from_name("figure-eight"),
            Some(TrackPreset::figure_eight())
        );
        assert_eq!(TrackPreset::from_name("square"), None);
    }
}
