//! Control programs
//!
//! The program is the part of the robot a user rewrites: it sees the sensor
//! reading once per frame and answers with two motor PWM values.

use super::follower::{FollowerOutput, LineFollower, LineFollowerConfig};
use crate::sensor::SensorReading;
use crate::{Error, Result};

/// Input handed to a control program every frame
#[derive(Debug, Clone, Copy)]
pub struct ControlInput {
    pub reading: SensorReading,
    /// Simulation time (seconds since reset)
    pub time: f64,
    /// Frame period (seconds)
    pub dt: f64,
}

/// Motor command produced by a control program
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlOutput {
    pub left_pwm: f64,
    pub right_pwm: f64,
    /// PID internals when the program has them
    pub diagnostics: Option<FollowerOutput>,
}

impl ControlOutput {
    pub fn new(left_pwm: f64, right_pwm: f64) -> Self {
        Self {
            left_pwm,
            right_pwm,
            diagnostics: None,
        }
    }
}

/// A robot control program
pub trait ControlProgram: Send {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Return to the power-on state
    fn reset(&mut self);

    /// Compute the motor command for one frame
    fn step(&mut self, input: &ControlInput) -> ControlOutput;

    /// Retune PID gains while running
    ///
    /// Programs without a PID controller reject this with `Error::Program`.
    fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) -> Result<()> {
        let _ = (kp, ki, kd);
        Err(Error::Program(format!(
            "program '{}' has no tunable gains",
            self.name()
        )))
    }
}

/// PID line follower as a control program
#[derive(Debug, Clone)]
pub struct PidProgram {
    follower: LineFollower,
}

impl PidProgram {
    pub fn new(config: LineFollowerConfig) -> Self {
        Self {
            follower: LineFollower::new(config),
        }
    }

    pub fn follower(&self) -> &LineFollower {
        &self.follower
    }

    pub fn follower_mut(&mut self) -> &mut LineFollower {
        &mut self.follower
    }
}

impl Default for PidProgram {
    fn default() -> Self {
        Self::new(LineFollowerConfig::default())
    }
}

impl ControlProgram for PidProgram {
    fn name(&self) -> &str {
        "pid"
    }

    fn reset(&mut self) {
        self.follower.reset();
    }

    fn step(&mut self, input: &ControlInput) -> ControlOutput {
        let out = self.follower.step(&input.reading, input.dt);
        ControlOutput {
            left_pwm: out.left_pwm,
            right_pwm: out.right_pwm,
            diagnostics: Some(out),
        }
    }

    fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) -> Result<()> {
        if ![kp, ki, kd].iter().all(|g| g.is_finite()) {
            return Err(Error::Program(format!(
                "gains must be finite, got kp={} ki={} kd={}",
                kp, ki, kd
            )));
        }
        self.follower.set_gains(kp, ki, kd);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::PidConfig;
    use crate::sensor::SensorPattern;
    use approx::assert_relative_eq;

    fn input(pattern: SensorPattern) -> ControlInput {
        ControlInput {
            reading: SensorReading::from_pattern(pattern),
            time: 0.0,
            dt: 0.02,
        }
    }

    #[test]
    fn test_pid_program_reports_diagnostics() {
        let config = LineFollowerConfig::default().with_pid(PidConfig::proportional(10.0));
        let mut program: Box<dyn ControlProgram> = Box::new(PidProgram::new(config));
        assert_eq!(program.name(), "pid");

        let out = program.step(&input(SensorPattern::LEFT));
        let diag = out.diagnostics.unwrap();
        assert_relative_eq!(diag.estimate.error, -2.0);
        assert_relative_eq!(out.left_pwm, 80.0);
        assert_relative_eq!(out.right_pwm, 120.0);
    }

    #[test]
    fn test_follower_mut_changes_speed() {
        let config = LineFollowerConfig::default().with_pid(PidConfig::proportional(10.0));
        let mut program = PidProgram::new(config);
        program.follower_mut().set_base_pwm(50.0);
        assert_relative_eq!(program.follower().config().base_pwm, 50.0);

        let out = program.step(&input(SensorPattern::CENTER));
        assert_relative_eq!(out.left_pwm, 50.0);
        assert_relative_eq!(out.right_pwm, 50.0);
    }

    #[test]
    fn test_set_gains_takes_effect() {
        let config = LineFollowerConfig::default().with_pid(PidConfig::proportional(10.0));
        let mut program = PidProgram::new(config);
        program.set_gains(0.0, 0.0, 0.0).unwrap();
        let out = program.step(&input(SensorPattern::RIGHT));
        assert_relative_eq!(out.left_pwm, out.right_pwm);
        assert!(program.set_gains(f64::NAN, 0.0, 0.0).is_err());
    }
}
