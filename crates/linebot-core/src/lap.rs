//! Lap timing
//!
//! The start/finish line passes through the start position, perpendicular
//! to the start heading, and is `2 * half_width` long. A lap is counted
//! when the robot crosses it in the forward direction after having left
//! the start area.

use serde::{Deserialize, Serialize};

use crate::math::{lerp, Pose2, Vec2};
use crate::{Error, Result};

/// Lap detection parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LapConfig {
    /// Half length of the start/finish line (meters)
    pub half_width: f64,
    /// Distance from the start the robot must reach before a crossing counts
    pub min_departure: f64,
    /// Shortest lap accepted (seconds)
    pub min_lap_time: f64,
}

impl Default for LapConfig {
    fn default() -> Self {
        Self {
            half_width: 0.15,
            min_departure: 0.3,
            min_lap_time: 1.0,
        }
    }
}

impl LapConfig {
    /// Set the start/finish half width
    pub fn with_half_width(mut self, half_width: f64) -> Self {
        self.half_width = half_width;
        self
    }

    /// Set the departure distance
    pub fn with_min_departure(mut self, distance: f64) -> Self {
        self.min_departure = distance;
        self
    }

    /// Set the shortest accepted lap
    pub fn with_min_lap_time(mut self, seconds: f64) -> Self {
        self.min_lap_time = seconds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.half_width > 0.0) {
            return Err(Error::Config(format!(
                "lap.half_width must be positive, got {}",
                self.half_width
            )));
        }
        if !(self.min_departure >= 0.0) || !(self.min_lap_time >= 0.0) {
            return Err(Error::Config(
                "lap.min_departure and lap.min_lap_time must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// A completed lap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LapEvent {
    /// 1-based lap index
    pub lap_number: usize,
    /// Duration of the lap (seconds)
    pub lap_time: f64,
    /// Simulation time of the crossing (seconds)
    pub crossed_at: f64,
}

#[derive(Debug, Clone, Copy)]
struct StartLine {
    origin: Vec2,
    heading: Vec2,
    normal: Vec2,
}

impl StartLine {
    fn new(pose: &Pose2) -> Self {
        let heading = pose.heading();
        Self {
            origin: pose.position(),
            heading,
            normal: Vec2::new(-heading.y, heading.x),
        }
    }

    /// (along, lateral) coordinates of a point relative to the line
    fn project(&self, p: Vec2) -> (f64, f64) {
        let d = p - self.origin;
        (d.dot(&self.heading), d.dot(&self.normal))
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    along: f64,
    lateral: f64,
    time: f64,
}

/// Start/finish line crossing detector
#[derive(Debug, Clone)]
pub struct LapTimer {
    config: LapConfig,
    line: Option<StartLine>,
    armed: bool,
    prev: Option<Sample>,
    lap_start: f64,
    laps: Vec<LapEvent>,
}

impl LapTimer {
    pub fn new(config: LapConfig) -> Self {
        Self {
            config,
            line: None,
            armed: false,
            prev: None,
            lap_start: 0.0,
            laps: Vec::new(),
        }
    }

    pub fn config(&self) -> &LapConfig {
        &self.config
    }

    /// Place the start/finish line at `start` and clear all laps
    pub fn arm(&mut self, start: Pose2, time: f64) {
        let line = StartLine::new(&start);
        let (along, lateral) = line.project(start.position());
        self.line = Some(line);
        self.armed = false;
        self.prev = Some(Sample {
            along,
            lateral,
            time,
        });
        self.lap_start = time;
        self.laps.clear();
        tracing::debug!(
            "Lap line at ({:.3}, {:.3}) heading {:.3} rad",
            start.x,
            start.y,
            start.theta
        );
    }

    /// Remove the start/finish line and all laps
    pub fn reset(&mut self) {
        self.line = None;
        self.armed = false;
        self.prev = None;
        self.lap_start = 0.0;
        self.laps.clear();
    }

    /// Whether [`arm`](Self::arm) has been called
    pub fn is_active(&self) -> bool {
        self.line.is_some()
    }

    /// Whether the next forward crossing can count
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Feed a new pose; returns the lap completed by this sample, if any
    pub fn update(&mut self, pose: &Pose2, time: f64) -> Option<LapEvent> {
        let line = self.line?;
        let p = pose.position();
        let (along, lateral) = line.project(p);

        if !self.armed && (p - line.origin).norm() > self.config.min_departure {
            self.armed = true;
            tracing::debug!("Lap timer armed at t={:.3}", time);
        }

        let current = Sample {
            along,
            lateral,
            time,
        };
        let prev = self.prev.replace(current)?;

        if !(prev.along < 0.0 && along >= 0.0) || !self.armed {
            return None;
        }

        let frac = -prev.along / (along - prev.along);
        let cross_lateral = lerp(prev.lateral, lateral, frac);
        if cross_lateral.abs() > self.config.half_width {
            return None;
        }

        let crossed_at = lerp(prev.time, time, frac);
        let lap_time = crossed_at - self.lap_start;
        if lap_time < self.config.min_lap_time {
            return None;
        }

        let event = LapEvent {
            lap_number: self.laps.len() + 1,
            lap_time,
            crossed_at,
        };
        self.laps.push(event);
        self.lap_start = crossed_at;
        self.armed = false;

        tracing::info!("Lap {} completed in {:.3} s", event.lap_number, lap_time);
        Some(event)
    }

    /// All completed laps in order
    pub fn laps(&self) -> &[LapEvent] {
        &self.laps
    }

    pub fn lap_count(&self) -> usize {
        self.laps.len()
    }

    /// Shortest completed lap
    pub fn best_lap(&self) -> Option<&LapEvent> {
        self.laps
            .iter()
            .min_by(|a, b| a.lap_time.total_cmp(&b.lap_time))
    }

    pub fn last_lap(&self) -> Option<&LapEvent> {
        self.laps.last()
    }

    /// Time spent on the lap in progress
    pub fn current_lap_elapsed(&self, time: f64) -> f64 {
        if self.line.is_some() {
            (time - self.lap_start).max(0.0)
        } else {
            0.0
        }
    }
}
