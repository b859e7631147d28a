//! Closed-loop runs on the built-in tracks

use linebot_core::control::{DerivativeFilter, LinePosition};
use linebot_core::sensor::SensorNoise;
use linebot_core::sim::{
    ControllerKind, FrameLoop, FrameLoopConfig, LineSim, RunStatus, SimBackend, SimConfig,
};
use linebot_core::track::TrackPreset;

fn run_to_end(config: SimConfig) -> LineSim {
    let mut sim = LineSim::new(config).unwrap();
    let state = sim.run(1_000_000).unwrap();
    assert!(state.status.is_done());
    sim
}

#[test]
fn test_pid_completes_circle_laps() {
    let config = SimConfig::default()
        .with_preset(TrackPreset::circle())
        .with_max_laps(2)
        .with_max_time(60.0);
    let sim = run_to_end(config);

    assert_eq!(sim.status(), RunStatus::LapsCompleted);
    assert_eq!(sim.laps().len(), 2);
    for lap in sim.laps() {
        assert!(
            lap.lap_time > 10.0 && lap.lap_time < 25.0,
            "unexpected lap time {}",
            lap.lap_time
        );
    }
    let rms = sim.telemetry().error_rms().unwrap();
    assert!(rms < 1.5, "error rms {}", rms);
}

#[test]
fn test_pid_completes_oval_lap() {
    let config = SimConfig::default()
        .with_preset(TrackPreset::oval())
        .with_max_laps(1)
        .with_max_time(60.0);
    let sim = run_to_end(config);
    assert_eq!(sim.status(), RunStatus::LapsCompleted);
}

#[test]
fn test_figure_eight_drives_through_crossing() {
    let config = SimConfig::default()
        .with_preset(TrackPreset::figure_eight())
        .with_max_laps(1)
        .with_max_time(60.0);
    let mut sim = LineSim::new(config).unwrap();

    let mut saw_crossing = false;
    let (state, stats) = FrameLoop::run_sim(&mut sim, FrameLoopConfig::headless(), |step| {
        saw_crossing |= step.frame.position == LinePosition::Crossing;
    })
    .unwrap();

    assert_eq!(state.status, RunStatus::LapsCompleted);
    assert!(saw_crossing, "never saw all three sensors on the line");
    assert!(stats.frames > 0);
    // The center crossing is far from the start line and must not count
    assert_eq!(state.laps, 1);
    let lap = sim.laps()[0].lap_time;
    assert!(lap > 15.0 && lap < 40.0, "unexpected lap time {}", lap);
}

#[test]
fn test_bang_bang_sketch_completes_lap() {
    let config = SimConfig::default()
        .with_preset(TrackPreset::oval())
        .with_controller(ControllerKind::Sketch)
        .with_max_laps(1)
        .with_max_time(60.0);
    let sim = run_to_end(config);

    assert_eq!(sim.status(), RunStatus::LapsCompleted);
    assert_eq!(sim.program().name(), "bang-bang");
    assert!(sim.telemetry().error_rms().is_none());
}

#[test]
fn test_noisy_sensors_still_follow() {
    let config = SimConfig::default()
        .with_preset(TrackPreset::circle())
        .with_noise(SensorNoise {
            flip_probability: 0.01,
            seed: 42,
        })
        .with_max_laps(1)
        .with_max_time(40.0);
    let sim = run_to_end(config);
    assert_eq!(sim.status(), RunStatus::LapsCompleted);
}

#[test]
fn test_saved_track_runs_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let track = TrackPreset::circle().build(0.004, 0.02).unwrap();
    track.save(dir.path().join("tracks/circle.yaml")).unwrap();

    let config_path = dir.path().join("sim.yaml");
    std::fs::write(
        &config_path,
        "track:\n  file: tracks/circle.yaml\nphysics:\n  max_laps: 1\n  max_time: 40\n",
    )
    .unwrap();

    let config = SimConfig::from_yaml_file(&config_path).unwrap();
    let sim = run_to_end(config);
    assert_eq!(sim.status(), RunStatus::LapsCompleted);
    assert_eq!(sim.start_pose(), TrackPreset::circle().start_pose());
}

#[test]
fn test_reset_reproduces_the_run() {
    let config = SimConfig::default()
        .with_preset(TrackPreset::oval())
        .with_max_time(5.0);
    let mut sim = LineSim::new(config).unwrap();
    let first = sim.run(10_000).unwrap();
    sim.reset().unwrap();
    let second = sim.run(10_000).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_reset_reproduces_a_noisy_run() {
    let config = SimConfig::default()
        .with_preset(TrackPreset::circle())
        .with_noise(SensorNoise {
            flip_probability: 0.05,
            seed: 42,
        })
        .with_max_time(3.0);
    let mut sim = LineSim::new(config.clone()).unwrap();
    let first = sim.run(10_000).unwrap();
    sim.reset().unwrap();
    let second = sim.run(10_000).unwrap();
    assert_eq!(first, second);

    let fresh = LineSim::new(config).unwrap().run(10_000).unwrap();
    assert_eq!(first, fresh);
}

#[test]
fn test_shipped_config_loads_and_runs() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/sim.yaml");
    let config = SimConfig::from_yaml_file(path).unwrap();
    assert_eq!(config.controller.kind, ControllerKind::Pid);
    assert_eq!(
        config.controller.pid.derivative_filter,
        DerivativeFilter::LowPass { alpha: 0.5 }
    );
    assert_eq!(config.track.preset, TrackPreset::oval());

    let sim = run_to_end(config.with_max_time(2.0));
    assert_eq!(sim.status(), RunStatus::TimeLimit);
}
