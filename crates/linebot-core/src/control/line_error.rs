//! Sensor pattern to lateral error
//!
//! Three binary sensors only give a coarse position estimate. The error is
//! signed so that positive means the line is to the robot's right and the
//! robot has to turn right to recover it.
//!
//! | pattern | position    | error                                  |
//! |---------|-------------|----------------------------------------|
//! | `.C.`   | Centered    | 0                                      |
//! | `LC.`   | SlightLeft  | -1                                     |
//! | `L..`   | FarLeft     | -2                                     |
//! | `.CR`   | SlightRight | +1                                     |
//! | `..R`   | FarRight    | +2                                     |
//! | `LCR`   | Crossing    | 0                                      |
//! | `L.R`   | Split       | ±1 toward the remembered side, else 0  |
//! | `...`   | Lost        | ±lost_error toward the remembered side |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sensor::SensorPattern;

/// Default error reported while the line is lost
pub const DEFAULT_LOST_ERROR: f64 = 3.0;

/// Where the line sits relative to the sensor row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePosition {
    Centered,
    SlightLeft,
    FarLeft,
    SlightRight,
    FarRight,
    /// All three sensors on: a crossing or a perpendicular mark
    Crossing,
    /// Outer sensors on, center off
    Split,
    /// No sensor on
    Lost,
}

impl LinePosition {
    /// Classify a sensor pattern
    pub fn from_pattern(pattern: SensorPattern) -> Self {
        match (pattern.left(), pattern.center(), pattern.right()) {
            (false, true, false) => Self::Centered,
            (true, true, false) => Self::SlightLeft,
            (true, false, false) => Self::FarLeft,
            (false, true, true) => Self::SlightRight,
            (false, false, true) => Self::FarRight,
            (true, true, true) => Self::Crossing,
            (true, false, true) => Self::Split,
            (false, false, false) => Self::Lost,
        }
    }

    /// Side the line was seen on, if the pattern is side-biased
    pub fn side(self) -> Option<Side> {
        match self {
            Self::SlightLeft | Self::FarLeft => Some(Side::Left),
            Self::SlightRight | Self::FarRight => Some(Side::Right),
            _ => None,
        }
    }
}

impl fmt::Display for LinePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Centered => "centered",
            Self::SlightLeft => "slight-left",
            Self::FarLeft => "far-left",
            Self::SlightRight => "slight-right",
            Self::FarRight => "far-right",
            Self::Crossing => "crossing",
            Self::Split => "split",
            Self::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// Side of the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Sign of the error pointing toward this side
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Side::Left => -1.0,
            Side::Right => 1.0,
        }
    }
}

/// Result of one estimation step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineEstimate {
    /// Signed lateral error, positive when the line is to the right
    pub error: f64,
    pub position: LinePosition,
    /// The error was derived from the remembered side, not the pattern
    pub from_memory: bool,
}

/// Stateful mapping from sensor patterns to a lateral error
#[derive(Debug, Clone)]
pub struct LineErrorEstimator {
    lost_error: f64,
    memory: Option<Side>,
}

impl Default for LineErrorEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_LOST_ERROR)
    }
}

impl LineErrorEstimator {
    /// Create an estimator with no remembered side
    ///
    /// # Arguments
    /// * `lost_error` - Error magnitude reported while the line is lost
    pub fn new(lost_error: f64) -> Self {
        Self {
            lost_error: lost_error.abs(),
            memory: None,
        }
    }

    pub fn lost_error(&self) -> f64 {
        self.lost_error
    }

    /// Side the line was last seen on
    pub fn memory(&self) -> Option<Side> {
        self.memory
    }

    /// Forget the remembered side
    pub fn reset(&mut self) {
        self.memory = None;
    }

    /// Estimate the error for a pattern and update the directional memory
    pub fn estimate(&mut self, pattern: SensorPattern) -> LineEstimate {
        let position = LinePosition::from_pattern(pattern);

        if let Some(side) = position.side() {
            self.memory = Some(side);
        }

        let (error, from_memory) = match position {
            LinePosition::Centered | LinePosition::Crossing => (0.0, false),
            LinePosition::SlightLeft => (-1.0, false),
            LinePosition::FarLeft => (-2.0, false),
            LinePosition::SlightRight => (1.0, false),
            LinePosition::FarRight => (2.0, false),
            LinePosition::Split => match self.memory {
                Some(side) => (side.sign(), true),
                None => (0.0, false),
            },
            LinePosition::Lost => match self.memory {
                Some(side) => (side.sign() * self.lost_error, true),
                None => (0.0, false),
            },
        };

        LineEstimate {
            error,
            position,
            from_memory,
        }
    }
}
