//! Simulation configuration
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration: the default oval track with the PID program.
//!
//! ```yaml
//! track:
//!   preset:
//!     shape: circle
//!     radius: 0.5
//! controller:
//!   kind: pid
//!   base_pwm: 110
//!   pid:
//!     kp: 35.0
//!     kd: 1.2
//! physics:
//!   fps: 60
//!   max_laps: 3
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::control::{
    BangBangSketch, ControlProgram, LineFollowerConfig, PidConfig, PidProgram, SketchProgram,
    DEFAULT_LOST_ERROR,
};
use crate::lap::LapConfig;
use crate::math::Pose2;
use crate::robot::RobotConfig;
use crate::sensor::SensorNoise;
use crate::track::{TrackMap, TrackPreset};
use crate::{Error, Result};

/// Where the track bitmap comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Built-in shape, used when `file` is not set
    pub preset: TrackPreset,
    /// Track YAML (with image) or a bare image file
    pub file: Option<PathBuf>,
    /// Meters per pixel for presets and bare images
    pub resolution: f64,
    /// Painted line width for presets (meters)
    pub line_width: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            preset: TrackPreset::default(),
            file: None,
            resolution: 0.004,
            line_width: 0.02,
        }
    }
}

impl TrackConfig {
    /// Load or build the configured track
    pub fn build(&self) -> Result<TrackMap> {
        match &self.file {
            Some(path) => {
                let is_yaml = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
                tracing::info!("Loading track from {}", path.display());
                if is_yaml {
                    TrackMap::load(path)
                } else {
                    TrackMap::from_image(path, self.resolution)
                }
            }
            None => self.preset.build(self.resolution, self.line_width),
        }
    }
}

/// Which control program drives the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    Pid,
    Sketch,
}

impl Default for ControllerKind {
    fn default() -> Self {
        Self::Pid
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pid => write!(f, "pid"),
            Self::Sketch => write!(f, "sketch"),
        }
    }
}

/// Speeds of the stock bang-bang sketch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    pub fast: i32,
    pub slow: i32,
}

impl Default for SketchConfig {
    fn default() -> Self {
        let stock = BangBangSketch::default();
        Self {
            fast: stock.fast,
            slow: stock.slow,
        }
    }
}

/// Control program selection and tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub kind: ControllerKind,
    /// PWM of both wheels when the line is centered
    pub base_pwm: f64,
    /// Allow negative PWM
    pub allow_reverse: bool,
    /// Error magnitude used while the line is lost
    pub lost_error: f64,
    pub pid: PidConfig,
    pub sketch: SketchConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let follower = LineFollowerConfig::default();
        Self {
            kind: ControllerKind::Pid,
            base_pwm: follower.base_pwm,
            allow_reverse: follower.allow_reverse,
            lost_error: DEFAULT_LOST_ERROR,
            pid: follower.pid,
            sketch: SketchConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Line follower settings for a robot with the given PWM ceiling
    pub fn follower_config(&self, pwm_max: f64) -> LineFollowerConfig {
        LineFollowerConfig {
            base_pwm: self.base_pwm,
            pwm_max,
            allow_reverse: self.allow_reverse,
            lost_error: self.lost_error,
            pid: self.pid,
        }
    }

    /// Instantiate the configured program
    pub fn build_program(&self, pwm_max: f64) -> Box<dyn ControlProgram> {
        match self.kind {
            ControllerKind::Pid => Box::new(PidProgram::new(self.follower_config(pwm_max))),
            ControllerKind::Sketch => {
                let sketch = BangBangSketch {
                    fast: self.sketch.fast,
                    slow: self.sketch.slow,
                };
                Box::new(SketchProgram::with_limits(
                    sketch,
                    pwm_max.round() as i32,
                    self.allow_reverse,
                ))
            }
        }
    }
}

/// Time stepping and episode limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Frames per second; one control step per frame
    pub fps: f64,
    /// Stop after this much simulated time (seconds, 0 = no limit)
    pub max_time: f64,
    /// Stop after this many laps (0 = no limit)
    pub max_laps: usize,
    /// Stop when the line has been lost this long (seconds, 0 = never)
    pub lost_timeout: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            fps: 60.0,
            max_time: 120.0,
            max_laps: 0,
            lost_timeout: 3.0,
        }
    }
}

impl PhysicsConfig {
    /// Fixed step in seconds
    #[inline]
    pub fn dt(&self) -> f64 {
        1.0 / self.fps
    }

    /// Set the frame rate
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }
}

/// Telemetry retention
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Frames kept in the in-memory history
    pub history: usize,
    /// Queue length of each topic subscriber
    pub buffer: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            history: 600,
            buffer: 256,
        }
    }
}

/// Overall simulation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub track: TrackConfig,
    /// Start pose; defaults to the track's own start pose
    pub start: Option<Pose2>,
    pub robot: RobotConfig,
    pub controller: ControllerConfig,
    pub lap: LapConfig,
    pub physics: PhysicsConfig,
    pub noise: SensorNoise,
    pub telemetry: TelemetryConfig,
}

impl SimConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    ///
    /// A relative `track.file` is resolved against the config file's
    /// directory.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_yaml_str(&text)?;

        if let (Some(file), Some(dir)) = (config.track.file.as_mut(), path.parent()) {
            if file.is_relative() {
                *file = dir.join(&*file);
            }
        }
        tracing::info!("Loaded simulation config from {}", path.display());
        Ok(config)
    }

    /// Serialize to YAML
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check value ranges across all sections
    pub fn validate(&self) -> Result<()> {
        self.robot.validate()?;
        self.lap.validate()?;
        self.noise.validate()?;
        self.controller
            .follower_config(self.robot.pwm_max)
            .validate()?;

        if !(self.track.resolution > 0.0) || !(self.track.line_width > 0.0) {
            return Err(Error::Config(
                "track.resolution and track.line_width must be positive".into(),
            ));
        }
        let physics = &self.physics;
        if !(physics.fps > 0.0) || !physics.fps.is_finite() {
            return Err(Error::Config(format!(
                "physics.fps must be positive, got {}",
                physics.fps
            )));
        }
        if !(physics.max_time >= 0.0) || !(physics.lost_timeout >= 0.0) {
            return Err(Error::Config(
                "physics.max_time and physics.lost_timeout must be >= 0".into(),
            ));
        }
        Ok(())
    }

    /// Use a built-in track
    pub fn with_preset(mut self, preset: TrackPreset) -> Self {
        self.track.preset = preset;
        self.track.file = None;
        self
    }

    /// Load the track from a file
    pub fn with_track_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.track.file = Some(path.into());
        self
    }

    /// Override the start pose
    pub fn with_start(mut self, start: Pose2) -> Self {
        self.start = Some(start);
        self
    }

    /// Select the control program
    pub fn with_controller(mut self, kind: ControllerKind) -> Self {
        self.controller.kind = kind;
        self
    }

    /// Set the simulated time limit
    pub fn with_max_time(mut self, seconds: f64) -> Self {
        self.physics.max_time = seconds;
        self
    }

    /// Set the lap limit
    pub fn with_max_laps(mut self, laps: usize) -> Self {
        self.physics.max_laps = laps;
        self
    }

    /// Set sensor noise
    pub fn with_noise(mut self, noise: SensorNoise) -> Self {
        self.noise = noise;
        self
    }
}
