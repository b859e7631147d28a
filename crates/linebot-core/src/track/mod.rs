//! Track bitmaps
//!
//! A track is a grayscale image where dark pixels are the line to follow.
//! Metadata lives in a small YAML file next to the image, in the same spirit
//! as ROS map files:
//!
//! ```yaml
//! image: oval.png
//! resolution: 0.002      # meters per pixel
//! origin: [-0.75, -0.55] # world position of the bottom-left pixel
//! line_thresh: 0.5       # luminance below this fraction is line
//! start: { x: 0.0, y: -0.4, theta: 0.0 }
//! ```
//!
//! Besides loading and saving, the bitmap supports the editing operations a
//! track editor needs: painting and erasing brush strokes and clearing.

mod preset;

pub use preset::TrackPreset;

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::math::{point_segment_distance, Pose2, Vec2};
use crate::{Error, Result};

const WHITE: u8 = 255;
const BLACK: u8 = 0;

/// Largest bitmap a track may allocate (64 Mpx, one byte each)
pub const MAX_TRACK_PIXELS: u64 = 64 * 1024 * 1024;

/// Track metadata stored as YAML next to the image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Image filename (relative to the YAML file)
    pub image: String,

    /// Resolution in meters per pixel
    pub resolution: f64,

    /// World coordinates of the bottom-left pixel
    #[serde(default)]
    pub origin: [f64; 2],

    /// Luminance threshold as a fraction (0.0-1.0); darker pixels are line
    #[serde(default = "default_line_thresh")]
    pub line_thresh: f64,

    /// Suggested start pose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Pose2>,
}

fn default_line_thresh() -> f64 {
    0.5
}

fn threshold_to_pixel(thresh: f64) -> u8 {
    (thresh.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// A track bitmap placed in the world
#[derive(Debug, Clone)]
pub struct TrackMap {
    pixels: GrayImage,
    resolution: f64,
    origin: Vec2,
    /// Pixels strictly below this value are line
    line_threshold: u8,
    start: Option<Pose2>,
}

impl TrackMap {
    /// Create an empty (all white) track
    pub fn blank(width_px: u32, height_px: u32, resolution: f64, origin: Vec2) -> Result<Self> {
        if width_px == 0 || height_px == 0 {
            return Err(Error::Track(format!(
                "track dimensions must be non-zero, got {}x{}",
                width_px, height_px
            )));
        }
        let pixels = u64::from(width_px) * u64::from(height_px);
        if pixels > MAX_TRACK_PIXELS {
            return Err(Error::Track(format!(
                "{}x{} px track exceeds the {} pixel limit",
                width_px, height_px, MAX_TRACK_PIXELS
            )));
        }
        Self::from_pixels(
            GrayImage::from_pixel(width_px, height_px, Luma([WHITE])),
            resolution,
            origin,
        )
    }

    /// Wrap an existing grayscale image
    pub fn from_pixels(pixels: GrayImage, resolution: f64, origin: Vec2) -> Result<Self> {
        if !(resolution > 0.0) || !resolution.is_finite() {
            return Err(Error::Track(format!(
                "resolution must be positive, got {}",
                resolution
            )));
        }
        Ok(Self {
            pixels,
            resolution,
            origin,
            line_threshold: threshold_to_pixel(default_line_thresh()),
            start: None,
        })
    }

    /// Load a bare image file with its bottom-left corner at the world origin
    pub fn from_image<P: AsRef<Path>>(path: P, resolution: f64) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|e| Error::Track(format!("failed to load {}: {}", path.display(), e)))?
            .into_luma8();
        Self::from_pixels(img, resolution, Vec2::zeros())
    }

    /// Load a track from YAML metadata + image
    pub fn load<P: AsRef<Path>>(yaml_path: P) -> Result<Self> {
        let yaml_path = yaml_path.as_ref();
        let yaml = std::fs::read_to_string(yaml_path).map_err(|e| {
            Error::Track(format!("failed to read {}: {}", yaml_path.display(), e))
        })?;
        let metadata: TrackMetadata = serde_yaml::from_str(&yaml)?;

        let yaml_dir = yaml_path.parent().unwrap_or(Path::new("."));
        let mut track = Self::from_image(yaml_dir.join(&metadata.image), metadata.resolution)?;
        track.origin = Vec2::new(metadata.origin[0], metadata.origin[1]);
        track.line_threshold = threshold_to_pixel(metadata.line_thresh);
        track.start = metadata.start;

        tracing::info!(
            "Loaded track {} ({}x{} px, {} m/px)",
            yaml_path.display(),
            track.pixels.width(),
            track.pixels.height(),
            track.resolution
        );
        Ok(track)
    }

    /// Save the track as PNG + YAML metadata
    ///
    /// The image is written next to the YAML file, with the same stem.
    pub fn save<P: AsRef<Path>>(&self, yaml_path: P) -> Result<()> {
        let yaml_path = yaml_path.as_ref();
        let stem = yaml_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Track(format!("invalid track path {}", yaml_path.display())))?;
        let image_name = format!("{}.png", stem);

        let dir = yaml_path.parent().unwrap_or(Path::new("."));
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
        self.pixels.save(dir.join(&image_name))?;

        let metadata = TrackMetadata {
            image: image_name,
            resolution: self.resolution,
            origin: [self.origin.x, self.origin.y],
            line_thresh: self.line_threshold as f64 / 255.0,
            start: self.start,
        };
        std::fs::write(yaml_path, serde_yaml::to_string(&metadata)?)?;
        tracing::info!("Saved track to {}", yaml_path.display());
        Ok(())
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Meters per pixel
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// World coordinates of the bottom-left pixel corner
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Size of the track in meters (width, height)
    pub fn extent(&self) -> (f64, f64) {
        (
            self.pixels.width() as f64 * self.resolution,
            self.pixels.height() as f64 * self.resolution,
        )
    }

    /// Suggested start pose, if the track carries one
    pub fn start_pose(&self) -> Option<Pose2> {
        self.start
    }

    pub fn set_start_pose(&mut self, pose: Option<Pose2>) {
        self.start = pose;
    }

    /// Set the line threshold as a fraction of full luminance
    pub fn with_line_thresh(mut self, thresh: f64) -> Self {
        self.line_threshold = threshold_to_pixel(thresh);
        self
    }

    /// Raw pixel access, for renderers
    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Convert pixel coordinates to the world position of the pixel center
    pub fn pixel_to_world(&self, px: u32, py: u32) -> Vec2 {
        let row_from_bottom = (self.pixels.height() - 1 - py) as f64;
        Vec2::new(
            self.origin.x + (px as f64 + 0.5) * self.resolution,
            self.origin.y + (row_from_bottom + 0.5) * self.resolution,
        )
    }

    /// Convert world coordinates to pixel coordinates (row 0 is the top)
    pub fn world_to_pixel(&self, point: Vec2) -> Option<(u32, u32)> {
        let col = ((point.x - self.origin.x) / self.resolution).floor();
        let row_from_bottom = ((point.y - self.origin.y) / self.resolution).floor();
        let (w, h) = (self.pixels.width() as f64, self.pixels.height() as f64);

        if col >= 0.0 && row_from_bottom >= 0.0 && col < w && row_from_bottom < h {
            Some((col as u32, (h - 1.0 - row_from_bottom) as u32))
        } else {
            None
        }
    }

    /// Check whether the world point lies on the line
    ///
    /// Points outside the bitmap are never line.
    #[inline]
    pub fn is_line(&self, point: Vec2) -> bool {
        match self.world_to_pixel(point) {
            Some((px, py)) => self.pixels.get_pixel(px, py).0[0] < self.line_threshold,
            None => false,
        }
    }

    /// Check whether the world point lies inside the bitmap
    #[inline]
    pub fn contains(&self, point: Vec2) -> bool {
        self.world_to_pixel(point).is_some()
    }

    /// Paint a dark stroke of the given width along a polyline
    ///
    /// A single point paints a disc.
    pub fn paint_stroke(&mut self, points: &[Vec2], width: f64) -> Result<()> {
        self.stroke(points, width, BLACK)
    }

    /// Erase (paint white) along a polyline
    pub fn erase_stroke(&mut self, points: &[Vec2], width: f64) -> Result<()> {
        self.stroke(points, width, WHITE)
    }

    /// Erase the whole track
    pub fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = Luma([WHITE]);
        }
    }

    fn stroke(&mut self, points: &[Vec2], width: f64, value: u8) -> Result<()> {
        if !(width > 0.0) || !width.is_finite() {
            return Err(Error::Track(format!(
                "brush width must be positive, got {}",
                width
            )));
        }
        let radius = width / 2.0;
        match points {
            [] => {}
            [p] => self.stamp_segment(*p, *p, radius, value),
            _ => {
                for pair in points.windows(2) {
                    self.stamp_segment(pair[0], pair[1], radius, value);
                }
            }
        }
        Ok(())
    }

    fn stamp_segment(&mut self, a: Vec2, b: Vec2, radius: f64, value: u8) {
        let w = self.pixels.width() as i64;
        let h = self.pixels.height() as i64;

        let to_col = |x: f64| ((x - self.origin.x) / self.resolution).floor() as i64;
        let to_row = |y: f64| ((y - self.origin.y) / self.resolution).floor() as i64;

        let col_lo = to_col(a.x.min(b.x) - radius).max(0);
        let col_hi = to_col(a.x.max(b.x) + radius).min(w - 1);
        let row_lo = to_row(a.y.min(b.y) - radius).max(0);
        let row_hi = to_row(a.y.max(b.y) + radius).min(h - 1);
        if col_lo > col_hi || row_lo > row_hi {
            return;
        }

        for row in row_lo..=row_hi {
            let py = (h - 1 - row) as u32;
            for col in col_lo..=col_hi {
                let px = col as u32;
                if point_segment_distance(self.pixel_to_world(px, py), a, b) <= radius {
                    self.pixels.put_pixel(px, py, Luma([value]));
                }
            }
        }
    }
}
