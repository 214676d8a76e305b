//! Single-pole smoothing filters
//!
//! Every running average in the modem (PLL lag phasor, frequency
//! correction, lock quality) is one of these exponential low-pass stages.

use num_complex::Complex;
use std::f64::consts::TAU;

/// Decay coefficient for a cutoff of `rc` Hz at the given sample rate.
/// Always falls in (0, 1) for positive inputs.
fn decay_coefficient(sample_rate: u32, rc: f64) -> f64 {
    TAU * rc / (sample_rate as f64 + TAU * rc)
}

/// Exponential low-pass over real values.
#[derive(Debug, Clone)]
pub struct SinglePoleFilter {
    alpha: f64,
    y: f64,
}

impl SinglePoleFilter {
    pub fn new(sample_rate: u32, rc: f64) -> Self {
        Self {
            alpha: decay_coefficient(sample_rate, rc),
            y: 0.0,
        }
    }

    /// Push one sample and return the new smoothed value.
    pub fn add(&mut self, x: f64) -> f64 {
        self.y += self.alpha * (x - self.y);
        self.y
    }
}

/// Exponential low-pass over complex values.
#[derive(Debug, Clone)]
pub struct ComplexFilter {
    alpha: f64,
    y: Complex<f64>,
}

impl ComplexFilter {
    pub fn new(sample_rate: u32, rc: f64) -> Self {
        Self {
            alpha: decay_coefficient(sample_rate, rc),
            y: Complex::new(0.0, 0.0),
        }
    }

    /// Push one sample and return the new smoothed value.
    pub fn add(&mut self, x: Complex<f64>) -> Complex<f64> {
        self.y += self.alpha * (x - self.y);
        self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_coefficient_in_unit_range() {
        for &(sr, rc) in &[(8000u32, 15.0), (8000, 30.0), (8000, 200.0), (44100, 15.0)] {
            let alpha = decay_coefficient(sr, rc);
            assert!(alpha > 0.0 && alpha < 1.0, "alpha={} for sr={} rc={}", alpha, sr, rc);
        }
    }

    #[test]
    fn test_step_response_converges() {
        let mut filter = SinglePoleFilter::new(8000, 200.0);
        let mut y = 0.0;
        for _ in 0..8000 {
            y = filter.add(1.0);
        }
        assert!((y - 1.0).abs() < 1e-3, "settled at {}", y);
    }

    #[test]
    fn test_output_stays_between_input_and_state() {
        let mut filter = SinglePoleFilter::new(8000, 30.0);
        let first = filter.add(1.0);
        assert!(first > 0.0 && first < 1.0);
        let second = filter.add(1.0);
        assert!(second > first && second < 1.0);
    }

    #[test]
    fn test_complex_filter_matches_real_on_real_axis() {
        let mut real = SinglePoleFilter::new(8000, 30.0);
        let mut complex = ComplexFilter::new(8000, 30.0);
        for i in 0..100 {
            let x = (i as f64 * 0.1).sin();
            let yr = real.add(x);
            let yc = complex.add(Complex::new(x, 0.0));
            assert!((yr - yc.re).abs() < 1e-12);
            assert_eq!(yc.im, 0.0);
        }
    }
}
