//! Line following control
//!
//! - [`LineErrorEstimator`] turns a sensor pattern into a signed error
//! - [`Pid`] turns the error into a speed adjustment
//! - [`LineFollower`] combines both into wheel PWMs
//! - [`ControlProgram`] is the per-frame interface the simulation drives,
//!   implemented by [`PidProgram`] and by Arduino-style [`SketchProgram`]s

mod follower;
mod line_error;
mod pid;
mod program;
mod sketch;

pub use follower::{FollowerOutput, LineFollower, LineFollowerConfig};
pub use line_error::{
    LineErrorEstimator, LineEstimate, LinePosition, Side, DEFAULT_LOST_ERROR,
};
pub use pid::{DerivativeFilter, Pid, PidConfig, PidState, PidTerms};
pub use program::{ControlInput, ControlOutput, ControlProgram, PidProgram};
pub use sketch::{pins, BangBangSketch, Board, Sketch, SketchProgram};
