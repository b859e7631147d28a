//! Fixed-rate frame loop
//!
//! Calls a frame callback at a target rate. In realtime mode frames are
//! paced against absolute deadlines so a slow frame does not shift every
//! later one; headless mode runs back to back. Either way the loop keeps
//! per-frame timing statistics.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::backend::{SimBackend, SimState, StepResult};
use crate::Result;

/// How the frame loop paces itself
#[derive(Debug, Clone)]
pub struct FrameLoopConfig {
    /// Target frame rate (Hz)
    pub rate_hz: f64,
    /// Label used in log lines
    pub name: Arc<str>,
    /// Log a warning whenever a frame misses its deadline
    pub warn_on_overrun: bool,
    /// Sleep until each deadline; otherwise run flat out
    pub realtime: bool,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            rate_hz: 60.0,
            name: "frame_loop".into(),
            warn_on_overrun: true,
            realtime: true,
        }
    }
}

impl FrameLoopConfig {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    /// Flat-out loop for tests and batch runs
    pub fn headless() -> Self {
        Self {
            realtime: false,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Frame budget; a non-positive or non-finite rate means no budget
    pub fn period(&self) -> Duration {
        if self.rate_hz > 0.0 && self.rate_hz.is_finite() {
            Duration::from_secs_f64(1.0 / self.rate_hz)
        } else {
            Duration::ZERO
        }
    }
}

/// Timing of the frames run so far
///
/// Frame time is the time spent inside the callback. The spread is tracked
/// with Welford's online mean/variance so long runs stay numerically stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameLoopStats {
    /// Frames run
    pub frames: u64,
    /// Frames whose callback took longer than the frame budget
    pub overruns: u64,
    /// Slowest frame
    pub slowest: Duration,
    /// Fastest frame
    pub fastest: Duration,
    /// Most recent frame
    pub last: Duration,
    busy: Duration,
    mean_secs: f64,
    sum_sq_dev: f64,
}

impl FrameLoopStats {
    /// Account for one frame that took `work` against a `budget`
    pub fn record(&mut self, work: Duration, budget: Duration) {
        self.frames += 1;
        self.busy += work;
        self.last = work;
        if self.frames == 1 {
            self.slowest = work;
            self.fastest = work;
        } else {
            self.slowest = self.slowest.max(work);
            self.fastest = self.fastest.min(work);
        }

        let secs = work.as_secs_f64();
        let delta = secs - self.mean_secs;
        self.mean_secs += delta / self.frames as f64;
        self.sum_sq_dev += delta * (secs - self.mean_secs);

        if !budget.is_zero() && work > budget {
            self.overruns += 1;
        }
    }

    /// Mean frame time
    pub fn mean(&self) -> Duration {
        if self.frames == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.busy.as_nanos() / u128::from(self.frames)) as u64)
        }
    }

    /// Total time spent inside the callback
    pub fn busy(&self) -> Duration {
        self.busy
    }

    /// Fraction of frames that overran, 0.0 to 1.0
    pub fn overrun_ratio(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.overruns as f64 / self.frames as f64
        }
    }

    /// Slowest minus fastest frame
    pub fn spread(&self) -> Duration {
        self.slowest.saturating_sub(self.fastest)
    }

    /// Sample standard deviation of the frame time in seconds
    pub fn std_dev(&self) -> f64 {
        if self.frames < 2 {
            0.0
        } else {
            (self.sum_sq_dev / (self.frames - 1) as f64).sqrt()
        }
    }
}

/// A fixed-rate frame loop
///
/// # Example
/// ```
/// use linebot_core::sim::{FrameLoop, FrameLoopConfig};
///
/// let config = FrameLoopConfig::headless().with_name("demo");
/// let stats = FrameLoop::run(config, |frame, _dt| frame + 1 < 10).unwrap();
/// assert_eq!(stats.frames, 10);
/// ```
pub struct FrameLoop;

impl FrameLoop {
    /// Run frames on the current thread until the callback returns false
    ///
    /// The callback gets the frame index and the wall-clock seconds since the
    /// previous frame started (0 on the first frame). The frame that returns
    /// false is still counted.
    pub fn run<F>(config: FrameLoopConfig, mut frame: F) -> Result<FrameLoopStats>
    where
        F: FnMut(u64, f64) -> bool,
    {
        let period = config.period();
        let mut stats = FrameLoopStats::default();
        let mut deadline = Instant::now();
        let mut previous: Option<Instant> = None;

        for index in 0.. {
            let started = Instant::now();
            let dt = previous.map_or(0.0, |p| started.duration_since(p).as_secs_f64());
            previous = Some(started);

            let keep_going = frame(index, dt);
            let work = started.elapsed();
            stats.record(work, period);
            if !keep_going {
                break;
            }

            if config.realtime {
                deadline += period;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else {
                    if config.warn_on_overrun && !period.is_zero() {
                        tracing::warn!(
                            "{}: frame {} missed its deadline by {:?}",
                            config.name,
                            index,
                            now - deadline
                        );
                    }
                    // Late frames do not try to catch up
                    deadline = now;
                }
            }
        }

        tracing::debug!(
            "{}: {} frames, mean {:?}, {} overruns",
            config.name,
            stats.frames,
            stats.mean(),
            stats.overruns
        );
        Ok(stats)
    }

    /// Like [`FrameLoop::run`], but stop once `limit` of wall-clock time has passed
    pub fn run_for<F>(
        config: FrameLoopConfig,
        limit: Duration,
        mut frame: F,
    ) -> Result<FrameLoopStats>
    where
        F: FnMut(u64, f64) -> bool,
    {
        let until = Instant::now() + limit;
        Self::run(config, |index, dt| frame(index, dt) && Instant::now() < until)
    }

    /// Step a simulation once per frame until it reports done
    ///
    /// `on_step` sees every step result. The first step error stops the
    /// loop and is returned.
    pub fn run_sim<B, F>(
        sim: &mut B,
        config: FrameLoopConfig,
        mut on_step: F,
    ) -> Result<(SimState, FrameLoopStats)>
    where
        B: SimBackend + ?Sized,
        F: FnMut(&StepResult),
    {
        if sim.state().status.is_done() {
            return Ok((sim.state(), FrameLoopStats::default()));
        }

        let mut failure = None;
        let stats = Self::run(config, |_, _| match sim.step() {
            Ok(result) => {
                on_step(&result);
                !result.done
            }
            Err(e) => {
                failure = Some(e);
                false
            }
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok((sim.state(), stats)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{LineSim, RunStatus, SimConfig};
    use crate::track::TrackPreset;

    #[test]
    fn test_counts_the_stopping_frame() {
        let config = FrameLoopConfig::new(1000.0).with_name("test");
        let mut seen = Vec::new();
        let stats = FrameLoop::run(config, |frame, _| {
            seen.push(frame);
            frame < 4
        })
        .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(stats.frames, 5);
    }

    #[test]
    fn test_realtime_holds_the_rate() {
        // 10 ms frames; the fifth frame stops before sleeping
        let config = FrameLoopConfig::new(100.0);
        let start = Instant::now();
        let stats = FrameLoop::run(config, |frame, _| frame < 4).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(stats.frames, 5);
        assert!(elapsed >= Duration::from_millis(35), "{:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(150), "{:?}", elapsed);
    }

    #[test]
    fn test_headless_does_not_sleep() {
        let config = FrameLoopConfig::new(10.0).with_realtime(false);
        let start = Instant::now();
        let stats = FrameLoop::run(config, |frame, _| frame < 19).unwrap();
        assert_eq!(stats.frames, 20);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_first_frame_has_zero_dt() {
        let mut dts = Vec::new();
        FrameLoop::run(FrameLoopConfig::new(200.0), |frame, dt| {
            dts.push(dt);
            frame < 2
        })
        .unwrap();
        assert_eq!(dts[0], 0.0);
        assert!(dts[1] > 0.0);
    }

    #[test]
    fn test_run_for_stops_on_wall_clock() {
        let config = FrameLoopConfig::new(100.0);
        let stats = FrameLoop::run_for(config, Duration::from_millis(100), |_, _| true).unwrap();

        // Roughly 10 frames; wide bounds for loaded CI machines
        assert!(
            (5..=20).contains(&stats.frames),
            "expected about 10 frames, got {}",
            stats.frames
        );
    }

    #[test]
    fn test_run_sim_until_done() {
        let config = SimConfig::default()
            .with_preset(TrackPreset::circle())
            .with_max_time(1.0);
        let mut sim = LineSim::new(config).unwrap();
        let mut steps = 0;
        let (state, stats) =
            FrameLoop::run_sim(&mut sim, FrameLoopConfig::headless(), |_| steps += 1).unwrap();
        assert_eq!(state.status, RunStatus::TimeLimit);
        assert_eq!(steps, 60);
        assert_eq!(stats.frames, 60);

        // A finished run is not stepped again
        let (again, stats) =
            FrameLoop::run_sim(&mut sim, FrameLoopConfig::headless(), |_| steps += 1).unwrap();
        assert_eq!(again, state);
        assert_eq!(stats.frames, 0);
        assert_eq!(steps, 60);
    }

    #[test]
    fn test_stats_track_spread_and_overruns() {
        let mut stats = FrameLoopStats::default();
        let budget = Duration::from_millis(10);
        for ms in [2u64, 4, 6, 20] {
            stats.record(Duration::from_millis(ms), budget);
        }
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.overruns, 1);
        assert_eq!(stats.spread(), Duration::from_millis(18));
        assert_eq!(stats.mean(), Duration::from_millis(8));
        assert!((stats.overrun_ratio() - 0.25).abs() < 1e-12);
        // Sample std dev of [2, 4, 6, 20] ms
        assert!((stats.std_dev() - 0.008_164_965_8).abs() < 1e-6);
    }

    #[test]
    fn test_zero_budget_never_overruns() {
        let mut stats = FrameLoopStats::default();
        stats.record(Duration::from_millis(5), Duration::ZERO);
        assert_eq!(stats.overruns, 0);
    }
}
