//! PID line follower
//!
//! Turns the lateral error into a differential speed adjustment around a
//! base PWM. A positive error (line to the right) speeds up the left wheel
//! and slows the right one so the robot turns right.

use serde::{Deserialize, Serialize};

use super::line_error::{LineErrorEstimator, LineEstimate, LinePosition, DEFAULT_LOST_ERROR};
use super::pid::{DerivativeFilter, Pid, PidConfig, PidTerms};
use crate::sensor::SensorReading;
use crate::{Error, Result};

/// Line follower tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFollowerConfig {
    /// PWM of both wheels when the line is centered
    pub base_pwm: f64,
    /// Largest PWM magnitude sent to a motor
    pub pwm_max: f64,
    /// Allow negative PWM (wheel running backwards)
    pub allow_reverse: bool,
    /// Error magnitude used while the line is lost
    pub lost_error: f64,
    /// PID gains
    pub pid: PidConfig,
}

impl Default for LineFollowerConfig {
    fn default() -> Self {
        Self {
            base_pwm: 100.0,
            pwm_max: 255.0,
            allow_reverse: false,
            lost_error: DEFAULT_LOST_ERROR,
            pid: PidConfig::new(35.0, 0.5, 1.2)
                .with_integral_limit(20.0)
                .with_derivative_filter(DerivativeFilter::MODERATE),
        }
    }
}

impl LineFollowerConfig {
    /// Set the base PWM
    pub fn with_base_pwm(mut self, base_pwm: f64) -> Self {
        self.base_pwm = base_pwm;
        self
    }

    /// Set the PWM ceiling
    pub fn with_pwm_max(mut self, pwm_max: f64) -> Self {
        self.pwm_max = pwm_max;
        self
    }

    /// Allow or forbid reversing a wheel
    pub fn with_allow_reverse(mut self, allow: bool) -> Self {
        self.allow_reverse = allow;
        self
    }

    /// Set the lost-line error magnitude
    pub fn with_lost_error(mut self, lost_error: f64) -> Self {
        self.lost_error = lost_error;
        self
    }

    /// Set the PID configuration
    pub fn with_pid(mut self, pid: PidConfig) -> Self {
        self.pid = pid;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pwm_max > 0.0) {
            return Err(Error::Config(format!(
                "controller.pwm_max must be positive, got {}",
                self.pwm_max
            )));
        }
        if !self.base_pwm.is_finite() || self.base_pwm.abs() > self.pwm_max {
            return Err(Error::Config(format!(
                "controller.base_pwm must be within ±{}, got {}",
                self.pwm_max, self.base_pwm
            )));
        }
        if !self.lost_error.is_finite() {
            return Err(Error::Config("controller.lost_error must be finite".into()));
        }
        self.pid.validate()
    }
}

/// Everything computed in one follower step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FollowerOutput {
    pub estimate: LineEstimate,
    pub terms: PidTerms,
    /// PID output added to the left wheel and subtracted from the right
    pub adjustment: f64,
    pub left_pwm: f64,
    pub right_pwm: f64,
}

/// Sensor reading to wheel PWM via the line error and a PID controller
#[derive(Debug, Clone)]
pub struct LineFollower {
    config: LineFollowerConfig,
    estimator: LineErrorEstimator,
    pid: Pid,
    lost: bool,
}

impl LineFollower {
    pub fn new(config: LineFollowerConfig) -> Self {
        Self {
            estimator: LineErrorEstimator::new(config.lost_error),
            pid: Pid::new(config.pid),
            config,
            lost: false,
        }
    }

    pub fn config(&self) -> &LineFollowerConfig {
        &self.config
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Whether the last reading saw no line
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Retune the PID gains without resetting the controller state
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.pid.set_gains(kp, ki, kd);
        self.config.pid = *self.pid.config();
        tracing::debug!("PID gains set to kp={} ki={} kd={}", kp, ki, kd);
    }

    /// Change the base PWM
    pub fn set_base_pwm(&mut self, base_pwm: f64) {
        self.config.base_pwm = base_pwm.clamp(-self.config.pwm_max, self.config.pwm_max);
    }

    /// Clear the PID state and the remembered line side
    pub fn reset(&mut self) {
        self.pid.reset();
        self.estimator.reset();
        self.lost = false;
    }

    /// Compute wheel PWMs for one reading
    pub fn step(&mut self, reading: &SensorReading, dt: f64) -> FollowerOutput {
        let estimate = self.estimator.estimate(reading.pattern);
        self.track_lost(&estimate);

        let adjustment = self.pid.update_error(estimate.error, dt);
        let terms = self.pid.terms();

        let limit = self.config.pwm_max;
        let min = if self.config.allow_reverse { -limit } else { 0.0 };
        let left_pwm = (self.config.base_pwm + adjustment).clamp(min, limit);
        let right_pwm = (self.config.base_pwm - adjustment).clamp(min, limit);

        FollowerOutput {
            estimate,
            terms,
            adjustment,
            left_pwm,
            right_pwm,
        }
    }

    fn track_lost(&mut self, estimate: &LineEstimate) {
        let lost = estimate.position == LinePosition::Lost;
        if lost && !self.lost {
            match self.estimator.memory() {
                Some(side) => tracing::warn!("Line lost, searching {:?}", side),
                None => tracing::warn!("Line lost with no remembered side"),
            }
        } else if !lost && self.lost {
            tracing::debug!("Line reacquired ({})", estimate.position);
        }
        self.lost = lost;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorPattern;
    use approx::assert_relative_eq;

    const DT: f64 = 1.0 / 60.0;

    fn p_only(kp: f64) -> LineFollower {
        LineFollower::new(LineFollowerConfig::default().with_pid(PidConfig::proportional(kp)))
    }

    fn reading(pattern: SensorPattern) -> SensorReading {
        SensorReading::from_pattern(pattern)
    }

    #[test]
    fn test_centered_drives_straight() {
        let mut follower = p_only(20.0);
        let out = follower.step(&reading(SensorPattern::CENTER), DT);
        assert_relative_eq!(out.left_pwm, 100.0);
        assert_relative_eq!(out.right_pwm, 100.0);
        assert_relative_eq!(out.adjustment, 0.0);
    }

    #[test]
    fn test_line_right_turns_right() {
        let mut follower = p_only(20.0);
        let out = follower.step(&reading(SensorPattern::RIGHT), DT);
        assert_relative_eq!(out.estimate.error, 2.0);
        assert_relative_eq!(out.left_pwm, 140.0);
        assert_relative_eq!(out.right_pwm, 60.0);
        assert_relative_eq!(out.terms.p, 40.0);
    }

    #[test]
    fn test_pwm_clamped_without_reverse() {
        let mut follower = p_only(100.0);
        let out = follower.step(&reading(SensorPattern::LEFT), DT);
        assert_relative_eq!(out.left_pwm, 0.0);
        assert_relative_eq!(out.right_pwm, 255.0);
    }

    #[test]
    fn test_reverse_allowed() {
        let config = LineFollowerConfig::default()
            .with_pid(PidConfig::proportional(100.0))
            .with_allow_reverse(true);
        let mut follower = LineFollower::new(config);
        let out = follower.step(&reading(SensorPattern::LEFT), DT);
        assert_relative_eq!(out.left_pwm, -100.0);
        assert_relative_eq!(out.right_pwm, 255.0);
    }

    #[test]
    fn test_lost_state_tracking() {
        let mut follower = p_only(10.0);
        follower.step(&reading(SensorPattern::RIGHT), DT);
        let out = follower.step(&reading(SensorPattern::NONE), DT);
        assert!(follower.is_lost());
        assert!(out.estimate.from_memory);
        assert_relative_eq!(out.estimate.error, DEFAULT_LOST_ERROR);

        follower.step(&reading(SensorPattern::CENTER), DT);
        assert!(!follower.is_lost());
    }

    #[test]
    fn test_set_gains_and_reset() {
        let mut follower = p_only(10.0);
        follower.set_gains(5.0, 0.0, 0.0);
        assert_relative_eq!(follower.config().pid.kp, 5.0);
        let out = follower.step(&reading(SensorPattern::new(false, true, true)), DT);
        assert_relative_eq!(out.adjustment, 5.0);

        follower.reset();
        let out = follower.step(&reading(SensorPattern::NONE), DT);
        assert_relative_eq!(out.estimate.error, 0.0);
    }

    #[test]
    fn test_set_base_pwm() {
        let mut follower = p_only(20.0);
        follower.set_base_pwm(150.0);
        let out = follower.step(&reading(SensorPattern::CENTER), DT);
        assert_relative_eq!(out.left_pwm, 150.0);
        assert_relative_eq!(out.right_pwm, 150.0);

        follower.set_base_pwm(1000.0);
        assert_relative_eq!(follower.config().base_pwm, 255.0);
    }

    #[test]
    fn test_validate() {
        assert!(LineFollowerConfig::default().validate().is_ok());
        assert!(LineFollowerConfig::default()
            .with_base_pwm(300.0)
            .validate()
            .is_err());
        assert!(LineFollowerConfig::default()
            .with_pwm_max(0.0)
            .validate()
            .is_err());
    }
}
