//! SE(2) pose of the robot on the track plane

use serde::{Deserialize, Serialize};

use super::{normalize_angle, Vec2};

/// Position and heading in the world frame
///
/// `theta` is measured counter-clockwise from +X. The robot's local frame
/// has +X pointing forward and +Y pointing to its left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "PoseFields")]
pub struct Pose2 {
    /// X position (meters)
    pub x: f64,
    /// Y position (meters)
    pub y: f64,
    /// Heading (radians)
    pub theta: f64,
}

// Deserialized poses go through `Pose2::new` so the heading is wrapped
#[derive(Deserialize)]
struct PoseFields {
    x: f64,
    y: f64,
    theta: f64,
}

impl From<PoseFields> for Pose2 {
    fn from(raw: PoseFields) -> Self {
        Pose2::new(raw.x, raw.y, raw.theta)
    }
}

impl Pose2 {
    /// Create a pose; the heading is normalized to [-π, π)
    #[inline]
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta: normalize_angle(theta),
        }
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Unit vector along the heading
    #[inline]
    pub fn heading(&self) -> Vec2 {
        Vec2::new(self.theta.cos(), self.theta.sin())
    }

    /// Transform a point from the robot frame into the world frame
    #[inline]
    pub fn transform_point(&self, local: Vec2) -> Vec2 {
        let (sin, cos) = self.theta.sin_cos();
        Vec2::new(
            self.x + local.x * cos - local.y * sin,
            self.y + local.x * sin + local.y * cos,
        )
    }

    /// Euclidean distance between the two positions
    #[inline]
    pub fn distance_to(&self, other: &Pose2) -> f64 {
        (self.position() - other.position()).norm()
    }
}
