//! Differential-drive robot model
//!
//! Two independently driven wheels on a common axle. Motor commands are
//! Arduino-style PWM duty values; each motor reaches its commanded speed
//! through a first-order lag.

use serde::{Deserialize, Serialize};

use crate::math::{Filter, LowPassFilter, Pose2};
use crate::sensor::SensorLayout;
use crate::{Error, Result};

/// Below this angular rate the pose is integrated as a straight line
const STRAIGHT_EPSILON: f64 = 1e-9;

/// Physical robot parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Distance between the wheels (meters)
    pub wheel_base: f64,
    /// Wheel surface speed at full PWM (m/s)
    pub max_wheel_speed: f64,
    /// PWM value corresponding to full speed
    pub pwm_max: f64,
    /// Motor time constant (seconds); 0 means the wheels respond instantly
    pub motor_time_constant: f64,
    /// Line sensor placement
    pub sensors: SensorLayout,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            wheel_base: 0.12,
            max_wheel_speed: 0.5,
            pwm_max: 255.0,
            motor_time_constant: 0.05,
            sensors: SensorLayout::default(),
        }
    }
}

impl RobotConfig {
    /// Set the wheel base
    pub fn with_wheel_base(mut self, wheel_base: f64) -> Self {
        self.wheel_base = wheel_base;
        self
    }

    /// Set the top wheel speed
    pub fn with_max_wheel_speed(mut self, speed: f64) -> Self {
        self.max_wheel_speed = speed;
        self
    }

    /// Set the motor time constant
    pub fn with_motor_time_constant(mut self, tau: f64) -> Self {
        self.motor_time_constant = tau;
        self
    }

    /// Set the sensor layout
    pub fn with_sensors(mut self, sensors: SensorLayout) -> Self {
        self.sensors = sensors;
        self
    }

    /// Check that the geometry is physically meaningful
    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(Error::Config(format!(
                    "robot.{} must be positive, got {}",
                    name, value
                )))
            }
        };
        positive("wheel_base", self.wheel_base)?;
        positive("max_wheel_speed", self.max_wheel_speed)?;
        positive("pwm_max", self.pwm_max)?;
        if !(self.motor_time_constant >= 0.0) {
            return Err(Error::Config(format!(
                "robot.motor_time_constant must be >= 0, got {}",
                self.motor_time_constant
            )));
        }
        self.sensors.validate()
    }
}

/// DC motor driven by PWM with a first-order speed response
#[derive(Debug, Clone)]
pub struct MotorModel {
    max_speed: f64,
    pwm_max: f64,
    time_constant: f64,
    speed: LowPassFilter,
}

impl MotorModel {
    /// Create a stopped motor
    pub fn new(max_speed: f64, pwm_max: f64, time_constant: f64) -> Self {
        Self {
            max_speed,
            pwm_max,
            time_constant,
            speed: LowPassFilter::new(1.0).primed(0.0),
        }
    }

    /// Wheel speed the motor settles at for a PWM value
    #[inline]
    pub fn target_speed(&self, pwm: f64) -> f64 {
        if !pwm.is_finite() {
            return 0.0;
        }
        pwm.clamp(-self.pwm_max, self.pwm_max) / self.pwm_max * self.max_speed
    }

    /// Apply a PWM command for `dt` seconds and return the wheel speed
    pub fn drive(&mut self, pwm: f64, dt: f64) -> f64 {
        let target = self.target_speed(pwm);
        self.speed
            .set_alpha(LowPassFilter::alpha_for(self.time_constant, dt));
        self.speed.update(target)
    }

    /// Current wheel surface speed (m/s)
    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed.value()
    }

    /// Stop the wheel immediately
    pub fn stop(&mut self) {
        self.speed.prime(0.0);
    }
}

/// Simulated differential-drive robot
#[derive(Debug, Clone)]
pub struct DifferentialDrive {
    config: RobotConfig,
    pose: Pose2,
    left: MotorModel,
    right: MotorModel,
    odometer: f64,
}

impl DifferentialDrive {
    /// Create a robot at rest at the given pose
    pub fn new(config: RobotConfig, pose: Pose2) -> Result<Self> {
        config.validate()?;
        let motor = MotorModel::new(
            config.max_wheel_speed,
            config.pwm_max,
            config.motor_time_constant,
        );
        Ok(Self {
            left: motor.clone(),
            right: motor,
            config,
            pose,
            odometer: 0.0,
        })
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    /// Current pose in the world frame
    #[inline]
    pub fn pose(&self) -> Pose2 {
        self.pose
    }

    /// Wheel speeds (left, right) in m/s
    #[inline]
    pub fn wheel_speeds(&self) -> (f64, f64) {
        (self.left.speed(), self.right.speed())
    }

    /// Forward speed of the axle center (m/s)
    #[inline]
    pub fn linear_velocity(&self) -> f64 {
        (self.left.speed() + self.right.speed()) / 2.0
    }

    /// Yaw rate (rad/s), positive counter-clockwise
    #[inline]
    pub fn angular_velocity(&self) -> f64 {
        (self.right.speed() - self.left.speed()) / self.config.wheel_base
    }

    /// Total distance traveled by the axle center since placement
    pub fn odometer(&self) -> f64 {
        self.odometer
    }

    /// Teleport the robot and stop both wheels
    pub fn place(&mut self, pose: Pose2) {
        self.pose = pose;
        self.left.stop();
        self.right.stop();
        self.odometer = 0.0;
    }

    /// Drive both motors for `dt` seconds and integrate the pose
    ///
    /// Returns the new pose.
    pub fn step(&mut self, left_pwm: f64, right_pwm: f64, dt: f64) -> Pose2 {
        if !(dt > 0.0) {
            return self.pose;
        }
        self.left.drive(left_pwm, dt);
        self.right.drive(right_pwm, dt);

        let v = self.linear_velocity();
        let w = self.angular_velocity();
        let Pose2 { x, y, theta } = self.pose;

        self.pose = if w.abs() < STRAIGHT_EPSILON {
            Pose2::new(x + v * theta.cos() * dt, y + v * theta.sin() * dt, theta)
        } else {
            // Exact integration along the arc of radius v / w
            let r = v / w;
            let new_theta = theta + w * dt;
            Pose2::new(
                x + r * (new_theta.sin() - theta.sin()),
                y + r * (theta.cos() - new_theta.cos()),
                new_theta,
            )
        };
        self.odometer += v.abs() * dt;
        self.pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn instant_robot() -> DifferentialDrive {
        let config = RobotConfig::default().with_motor_time_constant(0.0);
        DifferentialDrive::new(config, Pose2::default()).unwrap()
    }

    #[test]
    fn test_straight_line() {
        let mut robot = instant_robot();
        for _ in 0..10 {
            robot.step(255.0, 255.0, 0.1);
        }
        let pose = robot.pose();
        assert_relative_eq!(pose.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.theta, 0.0, epsilon = 1e-9);
        assert_relative_eq!(robot.odometer(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_spin_in_place() {
        let mut robot = instant_robot();
        robot.step(-127.5, 127.5, 0.1);
        let pose = robot.pose();
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-9);
        // w = 2 * 0.25 / 0.12
        assert_relative_eq!(pose.theta, 0.5 / 0.12 * 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_arc_turns_toward_slower_wheel() {
        let mut robot = instant_robot();
        robot.step(100.0, 200.0, 0.1);
        assert!(robot.pose().theta > 0.0, "slower left wheel turns left");
        assert!(robot.pose().y > 0.0);

        let mut robot = instant_robot();
        robot.step(200.0, 100.0, 0.1);
        assert!(robot.pose().theta < 0.0);
        assert!(robot.pose().y < 0.0);
    }

    #[test]
    fn test_full_circle_returns_home() {
        let mut robot = instant_robot();
        // Left 0.1 m/s, right 0.3 m/s: v = 0.2, w = 0.2 / 0.12
        let w = 0.2 / 0.12;
        let steps = 1000;
        let dt = 2.0 * PI / w / steps as f64;
        for _ in 0..steps {
            robot.step(51.0, 153.0, dt);
        }
        let pose = robot.pose();
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_motor_lag() {
        let mut motor = MotorModel::new(0.5, 255.0, 0.05);
        let first = motor.drive(255.0, 0.01);
        // alpha = 0.01 / 0.06
        assert_relative_eq!(first, 0.5 / 6.0, epsilon = 1e-12);
        for _ in 0..200 {
            motor.drive(255.0, 0.01);
        }
        assert_relative_eq!(motor.speed(), 0.5, epsilon = 1e-6);
        motor.stop();
        assert_relative_eq!(motor.speed(), 0.0);
    }

    #[test]
    fn test_pwm_is_clamped() {
        let motor = MotorModel::new(0.5, 255.0, 0.0);
        assert_relative_eq!(motor.target_speed(1000.0), 0.5);
        assert_relative_eq!(motor.target_speed(-1000.0), -0.5);
        assert_relative_eq!(motor.target_speed(f64::NAN), 0.0);
    }

    #[test]
    fn test_place_stops_motors() {
        let mut robot = instant_robot();
        robot.step(255.0, 255.0, 0.1);
        robot.place(Pose2::new(1.0, 1.0, 0.0));
        assert_eq!(robot.wheel_speeds(), (0.0, 0.0));
        assert_eq!(robot.pose(), Pose2::new(1.0, 1.0, 0.0));
        assert_relative_eq!(robot.odometer(), 0.0);
    }

    #[test]
    fn test_config_builders() {
        let layout = SensorLayout {
            forward_offset: 0.08,
            spacing: 0.02,
        };
        let config = RobotConfig::default()
            .with_max_wheel_speed(1.0)
            .with_motor_time_constant(0.0)
            .with_sensors(layout);
        assert_eq!(config.sensors, layout);

        let mut robot = DifferentialDrive::new(config, Pose2::default()).unwrap();
        robot.step(255.0, 255.0, 0.5);
        assert_relative_eq!(robot.pose().x, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_config() {
        let config = RobotConfig::default().with_wheel_base(0.0);
        assert!(DifferentialDrive::new(config, Pose2::default()).is_err());
        let config = RobotConfig::default().with_motor_time_constant(-1.0);
        assert!(config.validate().is_err());
    }
}
