//! First-order smoothing
//!
//! The motor model runs its wheel speed through a [`LowPassFilter`] so a
//! PWM step turns into an exponential approach instead of a jump.

/// A scalar signal smoother
pub trait Filter: Send + Sync {
    /// Feed one sample and get the smoothed value
    fn update(&mut self, value: f64) -> f64;

    /// Forget all history
    fn reset(&mut self);

    /// Smoothed value after the last sample
    fn value(&self) -> f64;
}

/// Exponential moving average: `y += alpha * (x - y)`
///
/// Until it is primed or fed, the filter has no history and the first
/// sample passes straight through.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    /// Weight of the new sample, in [0, 1]
    alpha: f64,
    value: f64,
    has_history: bool,
}

impl LowPassFilter {
    /// Build with a fixed weight; out-of-range weights are clamped
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: clamp_alpha(alpha),
            value: 0.0,
            has_history: false,
        }
    }

    /// A lag with time constant `tau` sampled every `dt`
    pub fn from_time_constant(tau: f64, dt: f64) -> Self {
        Self::new(Self::alpha_for(tau, dt))
    }

    /// Weight giving a first-order lag of `tau` seconds at sample period `dt`
    ///
    /// A non-positive `tau` (or `dt`) means no lag at all.
    #[inline]
    pub fn alpha_for(tau: f64, dt: f64) -> f64 {
        if tau <= 0.0 || dt <= 0.0 {
            1.0
        } else {
            clamp_alpha(dt / (tau + dt))
        }
    }

    /// Start from `value` instead of from the first sample
    pub fn primed(mut self, value: f64) -> Self {
        self.prime(value);
        self
    }

    /// Overwrite the history with `value`
    pub fn prime(&mut self, value: f64) {
        self.value = value;
        self.has_history = true;
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Change the weight without touching the history
    pub fn set_alpha(&mut self, alpha: f64) {
        self.alpha = clamp_alpha(alpha);
    }
}

fn clamp_alpha(alpha: f64) -> f64 {
    if alpha.is_nan() {
        1.0
    } else {
        alpha.clamp(0.0, 1.0)
    }
}

impl Filter for LowPassFilter {
    fn update(&mut self, value: f64) -> f64 {
        if self.has_history {
            self.value = self.alpha.mul_add(value - self.value, self.value);
        } else {
            self.prime(value);
        }
        self.value
    }

    fn reset(&mut self) {
        self.value = 0.0;
        self.has_history = false;
    }

    fn value(&self) -> f64 {
        self.value
    }
}

impl Default for LowPassFilter {
    fn default() -> Self {
        Self::new(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_sample_passes_through() {
        let mut filter = LowPassFilter::new(0.5);
        assert_relative_eq!(filter.update(10.0), 10.0);
        assert_relative_eq!(filter.update(0.0), 5.0);
    }

    #[test]
    fn test_primed_filter_lags() {
        let mut filter = LowPassFilter::new(0.5).primed(0.0);
        assert_relative_eq!(filter.update(10.0), 5.0);
        assert_relative_eq!(filter.update(10.0), 7.5);
    }

    #[test]
    fn test_time_constant_weights() {
        assert_relative_eq!(LowPassFilter::alpha_for(0.0, 0.01), 1.0);
        assert_relative_eq!(LowPassFilter::alpha_for(0.01, 0.01), 0.5);
        let filter = LowPassFilter::from_time_constant(0.1, 0.01);
        assert!(filter.alpha() > 0.0 && filter.alpha() < 0.5);
    }

    #[test]
    fn test_out_of_range_alpha_is_clamped() {
        assert_relative_eq!(LowPassFilter::new(1.5).alpha(), 1.0);
        assert_relative_eq!(LowPassFilter::new(-0.5).alpha(), 0.0);
        assert_relative_eq!(LowPassFilter::new(f64::NAN).alpha(), 1.0);
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut filter = LowPassFilter::new(0.5);
        filter.update(10.0);
        filter.update(10.0);
        filter.reset();
        assert_relative_eq!(filter.value(), 0.0);
        assert_relative_eq!(filter.update(4.0), 4.0);
    }
}
