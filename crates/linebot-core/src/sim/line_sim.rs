//! Line-following simulation
//!
//! One step at fixed `dt`:
//! 1. sample the sensors at the current pose
//! 2. run the control program
//! 3. drive the motors and integrate the pose
//! 4. check the start/finish line
//! 5. record and publish telemetry

use super::backend::{RunStatus, SimBackend, SimState, StepResult};
use super::SimConfig;
use crate::control::{ControlInput, ControlProgram, LinePosition};
use crate::lap::{LapEvent, LapTimer};
use crate::math::Pose2;
use crate::robot::DifferentialDrive;
use crate::sensor::{LineSensorArray, SensorPattern};
use crate::telemetry::{TelemetryFrame, TelemetryLog, TelemetryTopic, TopicConfig};
use crate::track::TrackMap;
use crate::{Error, Result};

/// Slack when comparing accumulated time against limits
const TIME_EPSILON: f64 = 1e-9;

/// Headless line-following simulation
pub struct LineSim {
    config: SimConfig,
    track: TrackMap,
    start: Pose2,
    robot: DifferentialDrive,
    sensors: LineSensorArray,
    program: Box<dyn ControlProgram>,
    lap_timer: LapTimer,
    log: TelemetryLog,
    topic: TelemetryTopic,
    steps: u64,
    lost_since: Option<f64>,
    pattern: SensorPattern,
    status: RunStatus,
}

impl std::fmt::Debug for LineSim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSim")
            .field("program", &self.program.name())
            .field("start", &self.start)
            .field("steps", &self.steps)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl LineSim {
    /// Build the track and program described by `config`
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let track = config.track.build()?;
        Self::with_track(config, track)
    }

    /// Use an already loaded or edited track
    pub fn with_track(config: SimConfig, track: TrackMap) -> Result<Self> {
        config.validate()?;
        let start = config.start.or_else(|| track.start_pose()).ok_or_else(|| {
            Error::Config("track has no start pose; set `start` in the config".into())
        })?;

        let robot = DifferentialDrive::new(config.robot.clone(), start)?;
        let sensors = LineSensorArray::new(&config.robot.sensors).with_noise(&config.noise)?;
        let program = config.controller.build_program(config.robot.pwm_max);
        let topic = TelemetryTopic::with_config(
            TopicConfig::new("telemetry")
                .buffer_size(config.telemetry.buffer)
                .latch(true),
        );

        let mut sim = Self {
            lap_timer: LapTimer::new(config.lap),
            log: TelemetryLog::new(config.telemetry.history),
            track,
            start,
            robot,
            sensors,
            program,
            topic,
            steps: 0,
            lost_since: None,
            pattern: SensorPattern::NONE,
            status: RunStatus::Running,
            config,
        };
        sim.reset()?;
        tracing::info!(
            "Simulation ready: {} program, {}x{} px track, {} fps",
            sim.program.name(),
            sim.track.width(),
            sim.track.height(),
            sim.config.physics.fps
        );
        Ok(sim)
    }

    pub fn track(&self) -> &TrackMap {
        &self.track
    }

    /// Edit the track in place; the robot keeps running on the new bitmap
    pub fn track_mut(&mut self) -> &mut TrackMap {
        &mut self.track
    }

    pub fn robot(&self) -> &DifferentialDrive {
        &self.robot
    }

    pub fn start_pose(&self) -> Pose2 {
        self.start
    }

    pub fn program(&self) -> &dyn ControlProgram {
        self.program.as_ref()
    }

    pub fn program_mut(&mut self) -> &mut dyn ControlProgram {
        self.program.as_mut()
    }

    /// Swap the control program; the new program starts from reset
    pub fn set_program(&mut self, mut program: Box<dyn ControlProgram>) {
        program.reset();
        tracing::info!(
            "Control program changed: {} -> {}",
            self.program.name(),
            program.name()
        );
        self.program = program;
    }

    /// Retune the running program's PID gains
    pub fn set_gains(&mut self, kp: f64, ki: f64, kd: f64) -> Result<()> {
        self.program.set_gains(kp, ki, kd)
    }

    /// Move the start pose and restart the run from it
    pub fn place_robot(&mut self, pose: Pose2) -> Result<SimState> {
        if !(pose.x.is_finite() && pose.y.is_finite() && pose.theta.is_finite()) {
            return Err(Error::InvalidState(format!(
                "cannot place robot at {:?}",
                pose
            )));
        }
        self.start = Pose2::new(pose.x, pose.y, pose.theta);
        self.reset()
    }

    pub fn lap_timer(&self) -> &LapTimer {
        &self.lap_timer
    }

    pub fn laps(&self) -> &[LapEvent] {
        self.lap_timer.laps()
    }

    pub fn telemetry(&self) -> &TelemetryLog {
        &self.log
    }

    /// Live telemetry; subscribe to receive every frame
    pub fn topic(&self) -> &TelemetryTopic {
        &self.topic
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    #[inline]
    fn time(&self) -> f64 {
        self.steps as f64 * self.config.physics.dt()
    }

    fn update_status(&self, time: f64) -> RunStatus {
        let physics = &self.config.physics;
        if physics.max_laps > 0 && self.lap_timer.lap_count() >= physics.max_laps {
            return RunStatus::LapsCompleted;
        }
        if physics.lost_timeout > 0.0 {
            if let Some(since) = self.lost_since {
                if time - since >= physics.lost_timeout - TIME_EPSILON {
                    return RunStatus::LineLost;
                }
            }
        }
        if physics.max_time > 0.0 && time >= physics.max_time - TIME_EPSILON {
            return RunStatus::TimeLimit;
        }
        RunStatus::Running
    }
}

impl SimBackend for LineSim {
    fn name(&self) -> &str {
        "line_sim"
    }

    fn config(&self) -> &SimConfig {
        &self.config
    }

    fn reset(&mut self) -> Result<SimState> {
        // Fresh noise stream so a reset run repeats the first one
        self.sensors =
            LineSensorArray::new(&self.config.robot.sensors).with_noise(&self.config.noise)?;
        self.topic.clear_latch();
        self.robot.place(self.start);
        self.program.reset();
        self.lap_timer.arm(self.start, 0.0);
        self.log.clear();
        self.steps = 0;
        self.lost_since = None;
        self.pattern = SensorPattern::NONE;
        self.status = RunStatus::Running;
        tracing::debug!("Simulation reset to {:?}", self.start);
        Ok(self.state())
    }

    fn step(&mut self) -> Result<StepResult> {
        if self.status.is_done() {
            return Err(Error::InvalidState(format!(
                "run already finished ({:?}); call reset",
                self.status
            )));
        }

        let dt = self.config.physics.dt();
        let now = self.time();

        let reading = self.sensors.read(&self.track, &self.robot.pose());
        let output = self.program.step(&ControlInput {
            reading,
            time: now,
            dt,
        });

        let pose = self.robot.step(output.left_pwm, output.right_pwm, dt);
        self.steps += 1;
        let time = self.time();

        let lap = self.lap_timer.update(&pose, time);

        self.pattern = reading.pattern;
        if reading.pattern.is_empty() {
            self.lost_since.get_or_insert(now);
        } else {
            self.lost_since = None;
        }

        self.status = self.update_status(time);
        match self.status {
            RunStatus::Running => {}
            RunStatus::LineLost => tracing::warn!(
                "Line lost for {:.2} s, stopping at t={:.2}",
                self.config.physics.lost_timeout,
                time
            ),
            status => tracing::info!("Run finished at t={:.2}: {:?}", time, status),
        }

        let diag = output.diagnostics;
        let (left_speed, right_speed) = self.robot.wheel_speeds();
        let frame = TelemetryFrame {
            time,
            pose,
            pattern: reading.pattern,
            position: diag
                .map(|d| d.estimate.position)
                .unwrap_or_else(|| LinePosition::from_pattern(reading.pattern)),
            error: diag.map(|d| d.estimate.error),
            terms: diag.map(|d| d.terms),
            adjustment: diag.map(|d| d.adjustment),
            left_pwm: output.left_pwm,
            right_pwm: output.right_pwm,
            left_speed,
            right_speed,
            laps: self.lap_timer.lap_count(),
        };
        self.log.push(frame);
        self.topic.publish(frame);

        Ok(StepResult {
            state: self.state(),
            frame,
            lap,
            done: self.status.is_done(),
        })
    }

    fn state(&self) -> SimState {
        SimState {
            sim_time: self.time(),
            steps: self.steps,
            pose: self.robot.pose(),
            wheel_speeds: self.robot.wheel_speeds(),
            pattern: self.pattern,
            laps: self.lap_timer.lap_count(),
            distance: self.robot.odometer(),
            status: self.status,
        }
    }
}
