//! Line sensor model
//!
//! Three reflectance sensors sit in a row ahead of the axle: left, center
//! and right. Each reports a single bit, "dark line underneath" or not.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::math::{Pose2, Vec2};
use crate::track::TrackMap;
use crate::{Error, Result};

/// Sensor indices into position arrays
pub mod idx {
    pub const LEFT: usize = 0;
    pub const CENTER: usize = 1;
    pub const RIGHT: usize = 2;
    pub const NUM_SENSORS: usize = 3;
}

/// Placement of the sensor row in the robot frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorLayout {
    /// Distance of the sensor row ahead of the axle (meters)
    pub forward_offset: f64,
    /// Lateral distance between neighbouring sensors (meters)
    pub spacing: f64,
}

impl Default for SensorLayout {
    fn default() -> Self {
        Self {
            forward_offset: 0.06,
            spacing: 0.015,
        }
    }
}

impl SensorLayout {
    pub fn validate(&self) -> Result<()> {
        if !(self.spacing > 0.0) || !self.spacing.is_finite() {
            return Err(Error::Config(format!(
                "sensors.spacing must be positive, got {}",
                self.spacing
            )));
        }
        if !self.forward_offset.is_finite() {
            return Err(Error::Config("sensors.forward_offset must be finite".into()));
        }
        Ok(())
    }

    /// Sensor positions in the robot frame: left, center, right
    pub fn local_positions(&self) -> [Vec2; idx::NUM_SENSORS] {
        [
            Vec2::new(self.forward_offset, self.spacing),
            Vec2::new(self.forward_offset, 0.0),
            Vec2::new(self.forward_offset, -self.spacing),
        ]
    }
}

/// On/off state of the three sensors packed as `L C R` bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorPattern(u8);

impl SensorPattern {
    pub const NONE: Self = Self(0b000);
    pub const LEFT: Self = Self(0b100);
    pub const CENTER: Self = Self(0b010);
    pub const RIGHT: Self = Self(0b001);
    pub const ALL: Self = Self(0b111);

    /// Build a pattern from individual sensor states
    #[inline]
    pub const fn new(left: bool, center: bool, right: bool) -> Self {
        Self(((left as u8) << 2) | ((center as u8) << 1) | (right as u8))
    }

    /// Build from raw bits; bits above the third are ignored
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn left(self) -> bool {
        self.0 & Self::LEFT.0 != 0
    }

    #[inline]
    pub const fn center(self) -> bool {
        self.0 & Self::CENTER.0 != 0
    }

    #[inline]
    pub const fn right(self) -> bool {
        self.0 & Self::RIGHT.0 != 0
    }

    /// Sensor state by index (see [`idx`])
    #[inline]
    pub fn get(self, index: usize) -> bool {
        match index {
            idx::LEFT => self.left(),
            idx::CENTER => self.center(),
            idx::RIGHT => self.right(),
            _ => false,
        }
    }

    /// No sensor sees the line
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of sensors on the line
    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl fmt::Display for SensorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = |on: bool, ch: char| if on { ch } else { '.' };
        write!(
            f,
            "{}{}{}",
            c(self.left(), 'L'),
            c(self.center(), 'C'),
            c(self.right(), 'R')
        )
    }
}

/// One sample of the sensor row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Detected pattern (after noise)
    pub pattern: SensorPattern,
    /// World positions of left, center and right sensors
    pub positions: [Vec2; idx::NUM_SENSORS],
}

impl SensorReading {
    /// A reading with the given pattern and no position information
    pub fn from_pattern(pattern: SensorPattern) -> Self {
        Self {
            pattern,
            positions: [Vec2::zeros(); idx::NUM_SENSORS],
        }
    }
}

impl Default for SensorReading {
    fn default() -> Self {
        Self::from_pattern(SensorPattern::NONE)
    }
}

/// Random bit flips applied to every sensor sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorNoise {
    /// Probability (0.0-1.0) that a single sensor bit is inverted
    pub flip_probability: f64,
    /// RNG seed; 0 draws from OS entropy
    pub seed: u64,
}

impl SensorNoise {
    pub fn validate(&self) -> Result<()> {
        if (0.0..=1.0).contains(&self.flip_probability) {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "noise.flip_probability must be in [0, 1], got {}",
                self.flip_probability
            )))
        }
    }
}

struct NoiseSource {
    flip_probability: f64,
    rng: SmallRng,
}

impl fmt::Debug for NoiseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseSource")
            .field("flip_probability", &self.flip_probability)
            .finish()
    }
}

/// Left/center/right line sensor row
#[derive(Debug)]
pub struct LineSensorArray {
    local: [Vec2; idx::NUM_SENSORS],
    noise: Option<NoiseSource>,
}

impl LineSensorArray {
    /// Create a noise-free sensor array
    pub fn new(layout: &SensorLayout) -> Self {
        Self {
            local: layout.local_positions(),
            noise: None,
        }
    }

    /// Add random bit flips
    ///
    /// A zero flip probability leaves the array noise-free.
    pub fn with_noise(mut self, noise: &SensorNoise) -> Result<Self> {
        noise.validate()?;
        self.noise = if noise.flip_probability > 0.0 {
            let rng = if noise.seed == 0 {
                SmallRng::from_entropy()
            } else {
                SmallRng::seed_from_u64(noise.seed)
            };
            Some(NoiseSource {
                flip_probability: noise.flip_probability,
                rng,
            })
        } else {
            None
        };
        Ok(self)
    }

    /// Sensor positions in the world frame for the given robot pose
    pub fn world_positions(&self, pose: &Pose2) -> [Vec2; idx::NUM_SENSORS] {
        self.local.map(|p| pose.transform_point(p))
    }

    /// Sample the track under each sensor
    pub fn read(&mut self, track: &TrackMap, pose: &Pose2) -> SensorReading {
        let positions = self.world_positions(pose);
        let mut on = positions.map(|p| track.is_line(p));

        if let Some(noise) = self.noise.as_mut() {
            for bit in on.iter_mut() {
                if noise.rng.gen_bool(noise.flip_probability) {
                    *bit = !*bit;
                }
            }
        }

        SensorReading {
            pattern: SensorPattern::new(on[idx::LEFT], on[idx::CENTER], on[idx::RIGHT]),
            positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    /// Vertical line along x = 0, 2 cm wide
    fn vertical_line_track() -> TrackMap {
        let mut track = TrackMap::blank(200, 200, 0.002, Vec2::new(-0.2, -0.2)).unwrap();
        track
            .paint_stroke(&[Vec2::new(0.0, -0.2), Vec2::new(0.0, 0.2)], 0.02)
            .unwrap();
        track
    }

    #[test]
    fn test_pattern_bits() {
        let p = SensorPattern::new(true, false, true);
        assert!(p.left());
        assert!(!p.center());
        assert!(p.right());
        assert_eq!(p.count(), 2);
        assert_eq!(p.bits(), 0b101);
        assert_eq!(SensorPattern::from_bits(0xff), SensorPattern::ALL);
        assert!(SensorPattern::NONE.is_empty());
    }

    #[test]
    fn test_pattern_display() {
        assert_eq!(SensorPattern::new(true, true, false).to_string(), "LC.");
        assert_eq!(SensorPattern::NONE.to_string(), "...");
        assert_eq!(SensorPattern::ALL.to_string(), "LCR");
    }

    #[test]
    fn test_local_positions() {
        let layout = SensorLayout::default();
        let [l, c, r] = layout.local_positions();
        assert!(l.y > 0.0, "left sensor is on the robot's +Y side");
        assert_eq!(c.y, 0.0);
        assert!(r.y < 0.0);
    }

    #[test]
    fn test_centered_on_line() {
        let track = vertical_line_track();
        let mut sensors = LineSensorArray::new(&SensorLayout::default());
        // Facing +Y with the sensor row straddling x = 0
        let reading = sensors.read(&track, &Pose2::new(0.0, 0.0, FRAC_PI_2));
        assert!(reading.pattern.center());
        assert!(!reading.pattern.left());
        assert!(!reading.pattern.right());
    }

    #[test]
    fn test_line_to_the_right() {
        let track = vertical_line_track();
        let mut sensors = LineSensorArray::new(&SensorLayout::default());
        // Robot facing +Y and shifted left (-X): the line is on its right
        let reading = sensors.read(&track, &Pose2::new(-0.015, 0.0, FRAC_PI_2));
        assert_eq!(reading.pattern, SensorPattern::RIGHT);

        let reading = sensors.read(&track, &Pose2::new(0.015, 0.0, FRAC_PI_2));
        assert_eq!(reading.pattern, SensorPattern::LEFT);
    }

    #[test]
    fn test_off_track() {
        let track = vertical_line_track();
        let mut sensors = LineSensorArray::new(&SensorLayout::default());
        let reading = sensors.read(&track, &Pose2::new(0.1, 0.0, FRAC_PI_2));
        assert!(reading.pattern.is_empty());
    }

    #[test]
    fn test_noise_is_deterministic() {
        let track = vertical_line_track();
        let noise = SensorNoise {
            flip_probability: 0.3,
            seed: 7,
        };
        let mut a = LineSensorArray::new(&SensorLayout::default())
            .with_noise(&noise)
            .unwrap();
        let mut b = LineSensorArray::new(&SensorLayout::default())
            .with_noise(&noise)
            .unwrap();
        let pose = Pose2::new(0.0, 0.0, FRAC_PI_2);
        let mut flips = 0;
        for _ in 0..200 {
            let ra = a.read(&track, &pose);
            assert_eq!(ra, b.read(&track, &pose));
            if ra.pattern != SensorPattern::CENTER {
                flips += 1;
            }
        }
        assert!(flips > 0);
    }

    #[test]
    fn test_invalid_noise() {
        let noise = SensorNoise {
            flip_probability: 1.5,
            seed: 1,
        };
        assert!(LineSensorArray::new(&SensorLayout::default())
            .with_noise(&noise)
            .is_err());
    }
}
