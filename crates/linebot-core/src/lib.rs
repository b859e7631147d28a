//! linebot-core: simulation core for a line-following robot
//!
//! A small differential-drive robot with three downward-facing light sensors
//! follows a dark line painted on a track bitmap. The same control code that
//! would run on a microcontroller runs here against a simulated world.
//!
//! # Modules
//!
//! - [`math`] - Planar poses, angle helpers and filters
//! - [`track`] - Track bitmaps: loading, saving, painting and presets
//! - [`robot`] - Differential-drive kinematics and motor model
//! - [`sensor`] - Line sensor array and sensor patterns
//! - [`control`] - PID, line error estimation and control programs
//! - [`lap`] - Start/finish line crossing detection and lap times
//! - [`telemetry`] - Per-frame telemetry history and publishing
//! - [`sim`] - Simulation configuration, stepping and the frame loop
//!
//! # Data flow
//!
//! ```text
//! ┌─────────┐  pose   ┌─────────┐ pattern ┌───────────┐  pwm  ┌──────────┐
//! │  Robot  │────────►│ Sensors │────────►│  Program  │──────►│  Motors  │
//! └─────────┘         └─────────┘         └───────────┘       └──────────┘
//!      │                                        │                   │
//!      │ pose                                   │ diagnostics       │ v, ω
//!      ▼                                        ▼                   ▼
//! ┌─────────┐                             ┌───────────┐       ┌──────────┐
//! │LapTimer │                             │ Telemetry │       │Kinematics│
//! └─────────┘                             └───────────┘       └──────────┘
//! ```

#![warn(unused_must_use)]

pub mod control;
pub mod lap;
pub mod math;
pub mod robot;
pub mod sensor;
pub mod sim;
pub mod telemetry;
pub mod track;

// Re-exports for convenience
pub use control::{
    BangBangSketch, ControlProgram, LineErrorEstimator, LineFollower, Pid, PidConfig, PidProgram,
    Sketch, SketchProgram,
};
pub use lap::{LapConfig, LapEvent, LapTimer};
pub use math::{Filter, LowPassFilter, Pose2, Vec2};
pub use robot::{DifferentialDrive, RobotConfig};
pub use sensor::{LineSensorArray, SensorPattern, SensorReading};
pub use sim::{FrameLoop, FrameLoopConfig, LineSim, SimBackend, SimConfig};
pub use telemetry::{TelemetryFrame, TelemetryLog, TelemetryTopic};
pub use track::{TrackMap, TrackPreset};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for linebot-core
///
/// Use pattern matching to handle specific error cases, or use `?` to
/// propagate errors.
///
/// # Example
/// ```ignore
/// match SimConfig::from_yaml_file("sim.yaml") {
///     Ok(config) => { /* build the simulation */ },
///     Err(Error::Config(msg)) => eprintln!("Bad config: {}", msg),
///     Err(e) => return Err(e),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
#[must_use = "errors must be handled or explicitly ignored with let _ = ..."]
#[non_exhaustive]
pub enum Error {
    /// Invalid or unparsable configuration.
    /// Handle by: validating config before use, checking parameter ranges.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Track bitmap could not be loaded, decoded or edited.
    /// Handle by: checking the image path and metadata, brush widths.
    #[error("Track error: {0}")]
    Track(String),

    /// Filesystem error while reading or writing assets.
    /// Handle by: checking paths and permissions.
    #[error("I/O error: {0}")]
    Io(String),

    /// Telemetry or config could not be serialized.
    /// Handle by: checking for non-finite values in the data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Control program failed or was misused.
    /// Handle by: resetting the program, checking pin assignments.
    #[error("Program error: {0}")]
    Program(String),

    /// Operation attempted in invalid state (e.g., stepping a finished run).
    /// Handle by: checking the run status, calling reset.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(format!("YAML: {}", e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Track(format!("image: {}", e))
    }
}

/// Result type alias for linebot-core operations
pub type Result<T> = std::result::Result<T, Error>;
