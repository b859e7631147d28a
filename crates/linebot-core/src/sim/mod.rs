//! Simulation
//!
//! [`LineSim`] ties the track, robot, sensors, control program, lap timer
//! and telemetry together behind the [`SimBackend`] trait. [`FrameLoop`]
//! drives any backend at a fixed frame rate.
//!
//! # Example
//!
//! ```
//! use linebot_core::sim::{LineSim, SimBackend, SimConfig};
//! use linebot_core::TrackPreset;
//!
//! let config = SimConfig::default()
//!     .with_preset(TrackPreset::circle())
//!     .with_max_time(2.0);
//! let mut sim = LineSim::new(config)?;
//! let state = sim.run(1_000)?;
//! assert!(state.status.is_done());
//! # Ok::<(), linebot_core::Error>(())
//! ```

mod backend;
mod config;
mod frame_loop;
mod line_sim;

pub use backend::{RunStatus, SimBackend, SimState, StepResult};
pub use config::{
    ControllerConfig, ControllerKind, PhysicsConfig, SimConfig, SketchConfig, TelemetryConfig,
    TrackConfig,
};
pub use frame_loop::{FrameLoop, FrameLoopConfig, FrameLoopStats};
pub use line_sim::LineSim;
