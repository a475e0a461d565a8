use std::f64::consts::PI;

pub const DEFAULT_MIN_CUTOFF: f64 = 0.05;
pub const DEFAULT_BETA: f64 = 80.0;
pub const DEFAULT_DERIVATE_CUTOFF: f64 = 1.0;

#[derive(Debug, Clone, Default)]
struct LowPass {
    last: Option<f64>,
}

impl LowPass {
    fn apply(&mut self, value: f64, alpha: f64) -> f64 {
        let filtered = match self.last {
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        self.last = Some(filtered);
        filtered
    }
}

/// One Euro filter: a low-pass whose cutoff rises with the signal's speed,
/// so slow jitter is damped while fast motion stays responsive.
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    min_cutoff: f64,
    beta: f64,
    derivate_cutoff: f64,
    value: LowPass,
    derivative: LowPass,
    last_timestamp: Option<f64>,
}

impl Default for OneEuroFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CUTOFF, DEFAULT_BETA, DEFAULT_DERIVATE_CUTOFF)
    }
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f64, beta: f64, derivate_cutoff: f64) -> Self {
        Self {
            min_cutoff,
            beta,
            derivate_cutoff,
            value: LowPass::default(),
            derivative: LowPass::default(),
            last_timestamp: None,
        }
    }

    pub fn filter(&mut self, value: f64, timestamp: f64) -> f64 {
        let Some(last_timestamp) = self.last_timestamp else {
            self.last_timestamp = Some(timestamp);
            return self.value.apply(value, 1.0);
        };

        let dt = timestamp - last_timestamp;
        if dt <= 0.0 {
            return self.value.last.unwrap_or(value);
        }
        self.last_timestamp = Some(timestamp);

        let prev = self.value.last.unwrap_or(value);
        let dx = (value - prev) / dt;
        let edx = self.derivative.apply(dx, alpha(self.derivate_cutoff, dt));
        let cutoff = self.min_cutoff + self.beta * edx.abs();

        self.value.apply(value, alpha(cutoff, dt))
    }

    pub fn reset(&mut self) {
        self.value = LowPass::default();
        self.derivative = LowPass::default();
        self.last_timestamp = None;
    }
}

fn alpha(cutoff: f64, dt: f64) -> f64 {
    let tau = 1.0 / (2.0 * PI * cutoff);
    1.0 / (1.0 + tau / dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_passes_through() {
        let mut filter = OneEuroFilter::default();
        assert_eq!(filter.filter(0.42, 0.0), 0.42);
    }

    #[test]
    fn test_constant_signal_is_stable() {
        let mut filter = OneEuroFilter::default();
        for i in 0..30 {
            let out = filter.filter(0.5, i as f64 / 30.0);
            assert!((out - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_step_is_damped() {
        let mut filter = OneEuroFilter::new(1.0, 0.0, 1.0);
        filter.filter(0.0, 0.0);
        let out = filter.filter(1.0, 1.0 / 30.0);
        assert!(out > 0.0 && out < 1.0, "got {out}");
    }

    #[test]
    fn test_repeated_timestamp_keeps_estimate() {
        let mut filter = OneEuroFilter::default();
        filter.filter(0.2, 1.0);
        assert_eq!(filter.filter(0.9, 1.0), 0.2);
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut filter = OneEuroFilter::default();
        filter.filter(0.2, 0.0);
        filter.filter(0.3, 0.1);
        filter.reset();
        assert_eq!(filter.filter(0.8, 0.2), 0.8);
    }
}
