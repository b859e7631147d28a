//! Math utilities for planar robotics: poses, angles and filters
//!
//! Everything here lives in the ground plane. Vectors are nalgebra's
//! `Vector2<f64>`.

mod filter;
mod pose;

pub use filter::{Filter, LowPassFilter};
pub use pose::Pose2;

/// Type alias for 2D vectors
pub type Vec2 = nalgebra::Vector2<f64>;

/// Linearly interpolate between two values
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Normalize an angle to [-π, π)
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    const TWO_PI: f64 = 2.0 * std::f64::consts::PI;
    const INV_TWO_PI: f64 = 1.0 / TWO_PI;
    angle - TWO_PI * (angle * INV_TWO_PI + 0.5).floor()
}

/// Distance from point `p` to the segment `a`-`b`
#[inline]
pub fn point_segment_distance(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq <= f64::EPSILON {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}
