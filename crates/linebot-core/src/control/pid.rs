//! Steering PID
//!
//! The line error arrives in whole steps (0, ±1, ±2, ±lost), so a single
//! frame's derivative is a spike. The derivative can be low-pass filtered,
//! the integral is clamped, and the P, I and D contributions of the last
//! update are kept so telemetry can show what the controller was doing.

use serde::{Deserialize, Serialize};

use crate::math::LowPassFilter;
use crate::{Error, Result};

/// Smoothing applied to the derivative term
///
/// # Example
/// ```
/// use linebot_core::control::DerivativeFilter;
///
/// let preset = DerivativeFilter::MODERATE;
/// assert_eq!(preset.alpha(1.0 / 60.0), 0.5);
///
/// // Frame-rate independent: 50 ms lag whatever the frame rate
/// let lag = DerivativeFilter::TimeConstant { seconds: 0.05 };
/// assert!(lag.alpha(1.0 / 60.0) < lag.alpha(1.0 / 30.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivativeFilter {
    /// Raw frame-to-frame derivative
    #[default]
    Disabled,

    /// Fixed smoothing factor per frame; 1.0 passes the raw derivative
    LowPass { alpha: f64 },

    /// First-order lag with the given time constant
    TimeConstant { seconds: f64 },
}

impl DerivativeFilter {
    pub const NONE: Self = Self::Disabled;
    pub const LIGHT: Self = Self::LowPass { alpha: 0.8 };
    pub const MODERATE: Self = Self::LowPass { alpha: 0.5 };
    pub const HEAVY: Self = Self::LowPass { alpha: 0.2 };

    /// Smoothing factor for a frame of length `dt`
    pub fn alpha(&self, dt: f64) -> f64 {
        match *self {
            Self::Disabled => 1.0,
            Self::LowPass { alpha } => alpha.clamp(0.0, 1.0),
            Self::TimeConstant { seconds } => LowPassFilter::alpha_for(seconds, dt),
        }
    }
}

/// Gains and limits of the steering controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// The output is clamped to ±this (infinite = unclamped)
    pub output_limit: f64,
    /// The error integral is clamped to ±this
    pub integral_limit: f64,
    pub derivative_filter: DerivativeFilter,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            output_limit: f64::INFINITY,
            integral_limit: f64::INFINITY,
            derivative_filter: DerivativeFilter::Disabled,
        }
    }
}

impl PidConfig {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            ..Default::default()
        }
    }

    /// Proportional-only steering
    pub fn proportional(kp: f64) -> Self {
        Self::new(kp, 0.0, 0.0)
    }

    pub fn with_output_limit(mut self, limit: f64) -> Self {
        self.output_limit = limit;
        self
    }

    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit;
        self
    }

    pub fn with_derivative_filter(mut self, filter: DerivativeFilter) -> Self {
        self.derivative_filter = filter;
        self
    }

    /// Gains must be finite; limits must be non-negative
    pub fn validate(&self) -> Result<()> {
        if ![self.kp, self.ki, self.kd].iter().all(|g| g.is_finite()) {
            return Err(Error::Config(format!(
                "pid gains must be finite, got kp={} ki={} kd={}",
                self.kp, self.ki, self.kd
            )));
        }
        for (name, limit) in [
            ("output_limit", self.output_limit),
            ("integral_limit", self.integral_limit),
        ] {
            if !(limit >= 0.0) {
                return Err(Error::Config(format!(
                    "pid.{} must be >= 0, got {}",
                    name, limit
                )));
            }
        }
        match self.derivative_filter {
            DerivativeFilter::LowPass { alpha } if !(0.0..=1.0).contains(&alpha) => Err(
                Error::Config(format!("pid derivative alpha must be in [0, 1], got {}", alpha)),
            ),
            DerivativeFilter::TimeConstant { seconds }
                if !(seconds.is_finite() && seconds >= 0.0) =>
            {
                Err(Error::Config(format!(
                    "pid derivative time constant must be finite and >= 0, got {}",
                    seconds
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Contribution of each term to the last output
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidTerms {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl PidTerms {
    /// Unclamped sum of the terms
    #[inline]
    pub fn sum(&self) -> f64 {
        self.p + self.i + self.d
    }
}

/// Memory carried between updates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidState {
    /// Clamped integral of the error over time
    pub integral: f64,
    pub prev_error: f64,
    /// Derivative after smoothing
    pub derivative: f64,
    /// Clamped output of the last update
    pub output: f64,
    pub terms: PidTerms,
}

/// Steering controller: line error in, wheel speed adjustment out
///
/// # Example
/// ```
/// use linebot_core::control::{Pid, PidConfig};
///
/// let mut pid = Pid::new(
///     PidConfig::new(30.0, 0.5, 0.8)
///         .with_output_limit(255.0)
///         .with_integral_limit(10.0),
/// );
///
/// // Line slightly to the right, one 60 Hz frame
/// let adjustment = pid.update_error(1.0, 1.0 / 60.0);
/// assert!(adjustment > 30.0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Pid {
    config: PidConfig,
    state: PidState,
}

impl Pid {
    pub fn new(config: PidConfig) -> Self {
        Self {
            config,
            state: PidState::default(),
        }
    }

    /// Advance by `dt` seconds with the current line error
    ///
    /// A non-positive `dt` leaves the integral and derivative state
    /// untouched and returns the clamped proportional output.
    #[inline]
    pub fn update_error(&mut self, error: f64, dt: f64) -> f64 {
        let limit = self.config.output_limit;
        let p = self.config.kp * error;

        if !(dt > 0.0) {
            self.state.terms = PidTerms { p, i: 0.0, d: 0.0 };
            return p.clamp(-limit, limit);
        }

        let integral_limit = self.config.integral_limit;
        self.state.integral = error
            .mul_add(dt, self.state.integral)
            .clamp(-integral_limit, integral_limit);

        let raw = (error - self.state.prev_error) / dt;
        let alpha = self.config.derivative_filter.alpha(dt);
        self.state.derivative = alpha.mul_add(raw - self.state.derivative, self.state.derivative);

        let terms = PidTerms {
            p,
            i: self.config.ki * self.state.integral,
            d: self.config.kd * self.state.derivative,
        };
        let output = terms.sum().clamp(-limit, limit);

        self.state.prev_error = error;
        self.state.output = output;
        self.state.terms = terms;
        output
    }

    /// Forget the integral and the previous error
    pub fn reset(&mut self) {
        self.state = PidState::default();
    }

    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Terms of the last update
    pub fn terms(&self) -> PidTerms {
        self.state.terms
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Replace gains, limits and filter; the accumulated state is kept
    pub fn set_config(&mut self, config: PidConfig) {
        self.config = config;
    }

    /// Retune while running, keeping the accumulated state
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) {
        self.config.kp = kp;
        self.config.ki = ki;
        self.config.kd = kd;
    }
}
