use std::collections::VecDeque;

use super::TelemetryFrame;

/// Bounded history of telemetry frames, oldest first
#[derive(Debug, Clone)]
pub struct TelemetryLog {
    frames: VecDeque<TelemetryFrame>,
    capacity: usize,
}

impl TelemetryLog {
    /// Keep at most `capacity` frames; 0 keeps nothing
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a frame, evicting the oldest when full
    pub fn push(&mut self, frame: TelemetryFrame) {
        if self.capacity == 0 {
            return;
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn latest(&self) -> Option<&TelemetryFrame> {
        self.frames.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetryFrame> + '_ {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Root mean square of the lateral error over the retained frames
    ///
    /// Frames without an error value are skipped. Returns `None` when no
    /// frame has one.
    pub fn error_rms(&self) -> Option<f64> {
        let (sum, n) = self
            .frames
            .iter()
            .filter_map(|f| f.error)
            .fold((0.0, 0usize), |(sum, n), e| (e.mul_add(e, sum), n + 1));
        (n > 0).then(|| (sum / n as f64).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::sample_frame;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounded_history() {
        let mut log = TelemetryLog::new(3);
        for i in 0..5 {
            log.push(sample_frame(i as f64, None));
        }
        assert_eq!(log.len(), 3);
        let times: Vec<f64> = log.iter().map(|f| f.time).collect();
        assert_eq!(times, vec![2.0, 3.0, 4.0]);
        assert_relative_eq!(log.latest().unwrap().time, 4.0);
    }

    #[test]
    fn test_error_rms() {
        let mut log = TelemetryLog::new(10);
        assert!(log.error_rms().is_none());
        log.push(sample_frame(0.0, Some(1.0)));
        log.push(sample_frame(0.1, Some(-1.0)));
        log.push(sample_frame(0.2, None));
        log.push(sample_frame(0.3, Some(2.0)));
        log.push(sample_frame(0.4, Some(0.0)));
        // (1 + 1 + 4 + 0) / 4
        assert_relative_eq!(log.error_rms().unwrap(), 1.5f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_capacity() {
        let mut log = TelemetryLog::new(0);
        log.push(sample_frame(0.0, Some(1.0)));
        assert!(log.is_empty());
        log.clear();
        assert!(log.latest().is_none());
    }
}
