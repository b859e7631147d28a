//! Simulation backend trait

use serde::{Deserialize, Serialize};

use super::SimConfig;
use crate::lap::LapEvent;
use crate::math::Pose2;
use crate::sensor::SensorPattern;
use crate::telemetry::TelemetryFrame;
use crate::Result;

/// Why a run is (or is not) over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    /// The configured number of laps was completed
    LapsCompleted,
    /// The simulated time limit was reached
    TimeLimit,
    /// The line was lost for longer than the lost timeout
    LineLost,
}

impl RunStatus {
    #[inline]
    pub fn is_done(self) -> bool {
        self != Self::Running
    }

    /// Episode ended by failure
    #[inline]
    pub fn terminated(self) -> bool {
        self == Self::LineLost
    }

    /// Episode cut off by a limit
    #[inline]
    pub fn truncated(self) -> bool {
        self == Self::TimeLimit
    }
}

/// State returned from a simulation step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    /// Simulation time in seconds
    pub sim_time: f64,
    /// Steps taken since reset
    pub steps: u64,
    pub pose: Pose2,
    /// Wheel surface speeds (left, right) in m/s
    pub wheel_speeds: (f64, f64),
    /// Last sensor pattern
    pub pattern: SensorPattern,
    /// Laps completed since reset
    pub laps: usize,
    /// Distance driven since reset (meters)
    pub distance: f64,
    pub status: RunStatus,
}

/// Result from stepping the simulation
#[derive(Debug, Clone)]
pub struct StepResult {
    /// New state after step
    pub state: SimState,
    /// Telemetry of this step
    pub frame: TelemetryFrame,
    /// Lap completed during this step
    pub lap: Option<LapEvent>,
    /// Whether the episode is done
    pub done: bool,
}

/// Trait for simulation backends
///
/// A backend owns the world and the control program and advances both
/// by one fixed step per call.
pub trait SimBackend: Send {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Get the current configuration
    fn config(&self) -> &SimConfig;

    /// Reset the simulation to initial state
    fn reset(&mut self) -> Result<SimState>;

    /// Advance one step
    ///
    /// Stepping a finished run fails with `Error::InvalidState`.
    fn step(&mut self) -> Result<StepResult>;

    /// Get current state without stepping
    fn state(&self) -> SimState;

    /// Get current simulation time
    fn sim_time(&self) -> f64 {
        self.state().sim_time
    }

    /// Step until done or `max_steps` steps were taken
    fn run(&mut self, max_steps: u64) -> Result<SimState> {
        let mut state = self.state();
        for _ in 0..max_steps {
            if state.status.is_done() {
                break;
            }
            state = self.step()?.state;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_state() {
        let state = SimState::default();
        assert_eq!(state.sim_time, 0.0);
        assert_eq!(state.status, RunStatus::Running);
        assert!(!state.status.is_done());
    }

    #[test]
    fn test_run_status() {
        assert!(RunStatus::LineLost.terminated());
        assert!(RunStatus::TimeLimit.truncated());
        assert!(RunStatus::LapsCompleted.is_done());
        assert!(!RunStatus::LapsCompleted.terminated());
    }
}
