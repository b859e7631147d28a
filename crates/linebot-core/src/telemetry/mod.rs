//! Per-frame telemetry
//!
//! Every simulation step produces a [`TelemetryFrame`]. Frames are kept in a
//! bounded [`TelemetryLog`] for summaries and fanned out to live consumers
//! (plots, file writers) through a [`TelemetryTopic`].

mod log;
mod topic;

pub use self::log::TelemetryLog;
pub use topic::{Subscriber, Topic, TopicConfig};

use serde::{Deserialize, Serialize};

use crate::control::{LinePosition, PidTerms};
use crate::math::Pose2;
use crate::sensor::SensorPattern;
use crate::Result;

/// Topic carrying telemetry frames
pub type TelemetryTopic = Topic<TelemetryFrame>;

/// Snapshot of one simulation step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Simulation time (seconds)
    pub time: f64,
    pub pose: Pose2,
    pub pattern: SensorPattern,
    pub position: LinePosition,
    /// Lateral error, when the program computes one
    pub error: Option<f64>,
    pub terms: Option<PidTerms>,
    pub adjustment: Option<f64>,
    pub left_pwm: f64,
    pub right_pwm: f64,
    /// Wheel surface speeds after the step (m/s)
    pub left_speed: f64,
    pub right_speed: f64,
    /// Laps completed so far
    pub laps: usize,
}

impl TelemetryFrame {
    /// Encode as a single line of JSON (no trailing newline)
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
pub(crate) fn sample_frame(time: f64, error: Option<f64>) -> TelemetryFrame {
    TelemetryFrame {
        time,
        pose: Pose2::default(),
        pattern: SensorPattern::CENTER,
        position: LinePosition::Centered,
        error,
        terms: None,
        adjustment: None,
        left_pwm: 100.0,
        right_pwm: 100.0,
        left_speed: 0.2,
        right_speed: 0.2,
        laps: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_line() {
        let mut frame = sample_frame(1.5, Some(-1.0));
        frame.terms = Some(PidTerms {
            p: -35.0,
            i: 0.0,
            d: 0.0,
        });
        let line = frame.to_json_line().unwrap();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["time"], 1.5);
        assert_eq!(value["pattern"], 0b010);
        assert_eq!(value["position"], "centered");
        assert_eq!(value["terms"]["p"], -35.0);

        let back: TelemetryFrame = serde_json::from_str(&line).unwrap();
        assert_eq!(back, frame);
    }
}
