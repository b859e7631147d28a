//! linebot - headless line-following robot simulator
//!
//! ```bash
//! # Run the default oval with the PID program until 3 laps are done
//! linebot run --laps 3
//!
//! # Run a config file, pacing frames to wall-clock time, and log telemetry
//! linebot run --config configs/sim.yaml --realtime --telemetry run.jsonl
//!
//! # Drive a saved track at 120 Hz
//! linebot run --track tracks/eight.yaml --fps 120 --laps 1
//!
//! # Write a preset track to disk
//! linebot track --preset figure-eight --out tracks/eight.yaml
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`); sketch serial output
//! is logged under the `sketch` target.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use linebot_core::sim::{
    ControllerKind, FrameLoop, FrameLoopConfig, FrameLoopStats, LineSim, SimBackend, SimConfig,
    SimState,
};
use linebot_core::telemetry::{Subscriber, TelemetryFrame};
use linebot_core::{Error, Result, TrackPreset};

#[derive(Parser)]
#[command(name = "linebot")]
#[command(version, about = "Line-following robot simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a simulation headless and print lap times
    Run(RunArgs),
    /// Write a built-in track as PNG + YAML
    Track(TrackArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Simulation config (YAML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Built-in track to use instead of the configured one
    #[arg(long, conflicts_with = "track")]
    preset: Option<String>,

    /// Saved track (YAML metadata) to use instead of the configured one
    #[arg(long)]
    track: Option<PathBuf>,

    /// Simulation frame rate override (Hz)
    #[arg(long)]
    fps: Option<f64>,

    /// Simulated time limit in seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Stop after this many laps
    #[arg(short, long)]
    laps: Option<usize>,

    /// Drive with the bang-bang sketch instead of PID
    #[arg(long)]
    sketch: bool,

    /// Proportional gain override
    #[arg(long)]
    kp: Option<f64>,

    /// Integral gain override
    #[arg(long)]
    ki: Option<f64>,

    /// Derivative gain override
    #[arg(long)]
    kd: Option<f64>,

    /// Pace frames to wall-clock time
    #[arg(long)]
    realtime: bool,

    /// Write every telemetry frame as a JSON line to this file
    #[arg(short, long)]
    telemetry: Option<PathBuf>,
}

#[derive(Args)]
struct TrackArgs {
    /// circle, oval or figure-eight
    #[arg(short, long, default_value = "oval")]
    preset: String,

    /// Output YAML path; the PNG is written next to it
    #[arg(short, long)]
    out: PathBuf,

    /// Meters per pixel
    #[arg(long, default_value = "0.004")]
    resolution: f64,

    /// Line width in meters
    #[arg(long, default_value = "0.02")]
    line_width: f64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::Track(args) => write_track(args),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn parse_preset(name: &str) -> Result<TrackPreset> {
    TrackPreset::from_name(name).ok_or_else(|| {
        Error::Config(format!(
            "unknown preset '{}' (expected circle, oval or figure-eight)",
            name
        ))
    })
}

fn build_config(args: &RunArgs) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_yaml_file(path)?,
        None => {
            info!("Using default configuration");
            SimConfig::default()
        }
    };

    if let Some(name) = &args.preset {
        config = config.with_preset(parse_preset(name)?);
    }
    if let Some(path) = &args.track {
        config = config.with_track_file(path);
    }
    if let Some(fps) = args.fps {
        config.physics = config.physics.with_fps(fps);
    }
    if let Some(duration) = args.duration {
        config = config.with_max_time(duration);
    }
    if let Some(laps) = args.laps {
        config = config.with_max_laps(laps);
    }
    if args.sketch {
        config = config.with_controller(ControllerKind::Sketch);
    }
    let pid = &mut config.controller.pid;
    pid.kp = args.kp.unwrap_or(pid.kp);
    pid.ki = args.ki.unwrap_or(pid.ki);
    pid.kd = args.kd.unwrap_or(pid.kd);

    if config.physics.max_time <= 0.0 && config.physics.max_laps == 0 {
        return Err(Error::Config(
            "no stopping condition: set --duration or --laps".into(),
        ));
    }
    config.validate()?;
    Ok(config)
}

/// JSON-lines writer fed by a telemetry subscription
struct TelemetryWriter {
    subscriber: Subscriber<TelemetryFrame>,
    out: BufWriter<File>,
    written: usize,
}

impl TelemetryWriter {
    fn create(path: &Path, subscriber: Subscriber<TelemetryFrame>) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = File::create(path)
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            subscriber,
            out: BufWriter::new(file),
            written: 0,
        })
    }

    /// Write every frame queued so far
    fn drain(&mut self) -> Result<()> {
        for frame in self.subscriber.drain() {
            writeln!(self.out, "{}", frame.to_json_line()?)?;
            self.written += 1;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<usize> {
        self.drain()?;
        self.out.flush()?;
        Ok(self.written)
    }
}

fn run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let mut sim = LineSim::new(config)?;

    let mut writer = match &args.telemetry {
        Some(path) => Some(TelemetryWriter::create(path, sim.topic().subscribe())?),
        None => None,
    };

    let loop_config = FrameLoopConfig::new(sim.config().physics.fps)
        .with_name("linebot")
        .with_realtime(args.realtime);

    let mut write_error = None;
    let (state, stats) = FrameLoop::run_sim(&mut sim, loop_config, |step| {
        if let Some(lap) = step.lap {
            println!("  lap {:>3}  {:>8.3} s", lap.lap_number, lap.lap_time);
        }
        if write_error.is_none() {
            if let Some(w) = writer.as_mut() {
                if let Err(e) = w.drain() {
                    write_error = Some(e);
                }
            }
        }
    })?;

    if let Some(e) = write_error {
        return Err(e);
    }
    if let (Some(w), Some(path)) = (writer, &args.telemetry) {
        let frames = w.finish()?;
        info!("Wrote {} telemetry frames to {}", frames, path.display());
    }

    print_summary(&sim, &state, &stats);
    Ok(())
}

fn print_summary(sim: &LineSim, state: &SimState, stats: &FrameLoopStats) {
    println!();
    println!("Program:   {}", sim.program().name());
    println!("Status:    {:?}", state.status);
    println!("Sim time:  {:.2} s ({} steps)", state.sim_time, state.steps);
    println!("Distance:  {:.2} m", state.distance);
    println!("Laps:      {}", state.laps);

    let timer = sim.lap_timer();
    if let Some(best) = timer.best_lap() {
        println!("Best lap:  {:.3} s (lap {})", best.lap_time, best.lap_number);
    }
    let laps = timer.laps();
    if !laps.is_empty() {
        let mean = laps.iter().map(|l| l.lap_time).sum::<f64>() / laps.len() as f64;
        println!("Mean lap:  {:.3} s", mean);
    }
    if let Some(rms) = sim.telemetry().error_rms() {
        println!("Error RMS: {:.3} (last {} frames)", rms, sim.telemetry().len());
    }
    println!(
        "Frames:    {} (mean {:?}, slowest {:?}, {} overruns)",
        stats.frames,
        stats.mean(),
        stats.slowest,
        stats.overruns
    );
}

fn write_track(args: TrackArgs) -> Result<()> {
    let preset = parse_preset(&args.preset)?;
    let track = preset.build(args.resolution, args.line_width)?;
    track.save(&args.out)?;
    println!(
        "Wrote {} track ({}x{} px, {:.2} m centerline) to {}",
        args.preset,
        track.width(),
        track.height(),
        preset.length(),
        args.out.display()
    );
    Ok(())
}
