//! Arduino-style sketches
//!
//! A [`Sketch`] is written against a tiny board API: read digital pins,
//! write PWM pins, check the clock, print to the serial port. The
//! [`SketchProgram`] adapter wires that API to the simulated sensors and
//! motors.
//!
//! # Example
//! ```
//! use linebot_core::control::{pins, Board, Sketch, SketchProgram};
//!
//! struct Creep;
//!
//! impl Sketch for Creep {
//!     fn setup(&mut self, board: &mut dyn Board) {
//!         board.serial_println("creeping");
//!     }
//!
//!     fn run_loop(&mut self, board: &mut dyn Board) {
//!         let speed = if board.digital_read(pins::SENSOR_CENTER) { 80 } else { 0 };
//!         board.analog_write(pins::MOTOR_LEFT, speed);
//!         board.analog_write(pins::MOTOR_RIGHT, speed);
//!     }
//! }
//!
//! let program = SketchProgram::new(Creep);
//! ```

use super::program::{ControlInput, ControlOutput, ControlProgram};
use crate::sensor::SensorPattern;

/// Pin assignments of the simulated board
pub mod pins {
    /// Left line sensor (digital input)
    pub const SENSOR_LEFT: u8 = 2;
    /// Center line sensor (digital input)
    pub const SENSOR_CENTER: u8 = 3;
    /// Right line sensor (digital input)
    pub const SENSOR_RIGHT: u8 = 4;
    /// Left motor (PWM output)
    pub const MOTOR_LEFT: u8 = 5;
    /// Right motor (PWM output)
    pub const MOTOR_RIGHT: u8 = 6;
}

/// Hardware surface visible to a sketch
pub trait Board {
    /// `true` when the sensor on `pin` sees the line; unknown pins read low
    fn digital_read(&mut self, pin: u8) -> bool;

    /// Set the PWM duty of a motor pin
    fn analog_write(&mut self, pin: u8, value: i32);

    /// Milliseconds since the program was reset
    fn millis(&self) -> u64;

    /// Print a line on the serial console
    fn serial_println(&mut self, msg: &str);
}

/// User control code in setup/loop form
pub trait Sketch: Send {
    /// Called once before the first loop after every reset
    fn setup(&mut self, board: &mut dyn Board);

    /// Called once per frame
    fn run_loop(&mut self, board: &mut dyn Board);

    fn name(&self) -> &str {
        "sketch"
    }
}

/// Board backed by the simulated sensors and motors
#[derive(Debug, Clone)]
struct SimBoard {
    pattern: SensorPattern,
    millis: u64,
    pwm: [i32; 2],
    pwm_min: i32,
    pwm_max: i32,
}

impl SimBoard {
    fn new(pwm_max: i32, allow_reverse: bool) -> Self {
        Self {
            pattern: SensorPattern::NONE,
            millis: 0,
            pwm: [0; 2],
            pwm_min: if allow_reverse { -pwm_max } else { 0 },
            pwm_max,
        }
    }
}

impl Board for SimBoard {
    fn digital_read(&mut self, pin: u8) -> bool {
        match pin {
            pins::SENSOR_LEFT => self.pattern.left(),
            pins::SENSOR_CENTER => self.pattern.center(),
            pins::SENSOR_RIGHT => self.pattern.right(),
            _ => {
                tracing::debug!(target: "sketch", "digital_read on unconnected pin {}", pin);
                false
            }
        }
    }

    fn analog_write(&mut self, pin: u8, value: i32) {
        let slot = match pin {
            pins::MOTOR_LEFT => 0,
            pins::MOTOR_RIGHT => 1,
            _ => {
                tracing::debug!(target: "sketch", "analog_write on unconnected pin {}", pin);
                return;
            }
        };
        self.pwm[slot] = value.clamp(self.pwm_min, self.pwm_max);
    }

    fn millis(&self) -> u64 {
        self.millis
    }

    fn serial_println(&mut self, msg: &str) {
        tracing::info!(target: "sketch", "{}", msg);
    }
}

/// Runs a [`Sketch`] as a [`ControlProgram`]
#[derive(Debug)]
pub struct SketchProgram<S: Sketch> {
    sketch: S,
    board: SimBoard,
    needs_setup: bool,
}

impl<S: Sketch> SketchProgram<S> {
    /// Wrap a sketch; motor pins accept 0-255
    pub fn new(sketch: S) -> Self {
        Self::with_limits(sketch, 255, false)
    }

    /// Wrap a sketch with a custom PWM range
    pub fn with_limits(sketch: S, pwm_max: i32, allow_reverse: bool) -> Self {
        Self {
            sketch,
            board: SimBoard::new(pwm_max.abs(), allow_reverse),
            needs_setup: true,
        }
    }

    pub fn sketch(&self) -> &S {
        &self.sketch
    }

    pub fn sketch_mut(&mut self) -> &mut S {
        &mut self.sketch
    }
}

impl<S: Sketch> ControlProgram for SketchProgram<S> {
    fn name(&self) -> &str {
        self.sketch.name()
    }

    fn reset(&mut self) {
        self.board.pwm = [0; 2];
        self.board.millis = 0;
        self.board.pattern = SensorPattern::NONE;
        self.needs_setup = true;
    }

    fn step(&mut self, input: &ControlInput) -> ControlOutput {
        self.board.pattern = input.reading.pattern;
        self.board.millis = (input.time.max(0.0) * 1000.0) as u64;

        if self.needs_setup {
            tracing::debug!("Running setup() of sketch '{}'", self.sketch.name());
            self.sketch.setup(&mut self.board);
            self.needs_setup = false;
        }
        self.sketch.run_loop(&mut self.board);

        ControlOutput::new(f64::from(self.board.pwm[0]), f64::from(self.board.pwm[1]))
    }
}

/// Stock two-speed line follower
///
/// The wheel on the side of the line runs slow and the other runs fast.
/// When the line is lost the last command is held, so the robot keeps
/// turning toward where it last saw the line.
#[derive(Debug, Clone)]
pub struct BangBangSketch {
    pub fast: i32,
    pub slow: i32,
}

impl Default for BangBangSketch {
    fn default() -> Self {
        Self { fast: 120, slow: 20 }
    }
}

impl Sketch for BangBangSketch {
    fn setup(&mut self, board: &mut dyn Board) {
        board.analog_write(pins::MOTOR_LEFT, 0);
        board.analog_write(pins::MOTOR_RIGHT, 0);
        board.serial_println(&format!(
            "bang-bang ready (fast={}, slow={})",
            self.fast, self.slow
        ));
    }

    fn run_loop(&mut self, board: &mut dyn Board) {
        let left = board.digital_read(pins::SENSOR_LEFT);
        let center = board.digital_read(pins::SENSOR_CENTER);
        let right = board.digital_read(pins::SENSOR_RIGHT);

        let command = match (left, center, right) {
            (true, _, false) => Some((self.slow, self.fast)),
            (false, _, true) => Some((self.fast, self.slow)),
            (false, true, false) | (true, true, true) => Some((self.fast, self.fast)),
            // Lost or split: keep the previous command
            _ => None,
        };

        if let Some((l, r)) = command {
            board.analog_write(pins::MOTOR_LEFT, l);
            board.analog_write(pins::MOTOR_RIGHT, r);
        }
    }

    fn name(&self) -> &str {
        "bang-bang"
    }
}
