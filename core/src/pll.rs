//! Carrier-tracking phase-locked loop
//!
//! One tracker per detector: a reference oscillator is multiplied against
//! the input, the complex product is smoothed into a lag phasor, and the
//! phasor angle closes the loop as a bounded frequency correction. The
//! ratio of input magnitude to lag magnitude doubles as a lock-quality
//! measure: coherent input accumulates into a large lag phasor (low ratio),
//! uncorrelated input averages toward zero (high ratio).

use crate::filter::{ComplexFilter, SinglePoleFilter};
use num_complex::Complex;
use std::f64::consts::{PI, TAU};

/// Cutoff of the lock-quality smoothing filter (Hz)
const LOCK_FILTER_CUTOFF: f64 = 15.0;

/// Loop gain divisor applied to the lag phasor angle
const LOOP_GAIN_DIVISOR: f64 = 65.0;

/// One PLL step: the smoothed frequency correction in Hz relative to the
/// nominal carrier, and the smoothed lock quality.
#[derive(Debug, Clone, Copy)]
pub struct PllReading {
    pub frequency: f64,
    pub lock: f64,
}

/// Closed-loop tracker for a single nominal carrier.
///
/// With `ignore_inversions` set (answer-tone detection), each input sample
/// is squared to erase 180-degree phase reversals; squaring doubles the
/// effective carrier rate, so the nominal frequency and the deviation
/// clamp are doubled to match. The lag and frequency filters keep the
/// un-doubled deviation as their cutoff.
#[derive(Debug, Clone)]
pub struct CarrierTracker {
    sample_rate: u32,
    frequency: f64,
    max_deviation: f64,
    square_input: bool,
    lag_filter: ComplexFilter,
    freq_filter: SinglePoleFilter,
    lock_filter: SinglePoleFilter,
    phase: f64,
}

impl CarrierTracker {
    pub fn new(sample_rate: u32, frequency: u32, max_deviation: u32, ignore_inversions: bool) -> Self {
        let base_deviation = max_deviation as f64;
        let (frequency, max_deviation) = if ignore_inversions {
            (2.0 * frequency as f64, 2.0 * base_deviation)
        } else {
            (frequency as f64, base_deviation)
        };
        Self {
            sample_rate,
            frequency,
            max_deviation,
            square_input: ignore_inversions,
            lag_filter: ComplexFilter::new(sample_rate, base_deviation),
            freq_filter: SinglePoleFilter::new(sample_rate, base_deviation),
            lock_filter: SinglePoleFilter::new(sample_rate, LOCK_FILTER_CUTOFF),
            phase: 0.0,
        }
    }

    /// Process one normalized sample and return the loop outputs.
    pub fn advance(&mut self, sample: f64) -> PllReading {
        let sample = if self.square_input { sample * sample } else { sample };

        let reference = Complex::from_polar(1.0, -self.phase);
        let lag = self.lag_filter.add(sample * reference);
        let correction = ((lag.arg() / LOOP_GAIN_DIVISOR) * self.sample_rate as f64 / TAU)
            .clamp(-self.max_deviation, self.max_deviation);
        let frequency = self.freq_filter.add(correction);

        let lag_magnitude = lag.norm();
        let quality = if lag_magnitude == 0.0 {
            1.0
        } else {
            sample.abs() / lag_magnitude
        };
        let lock = self.lock_filter.add(quality);

        self.phase += TAU * (self.frequency + frequency) / self.sample_rate as f64;
        if self.phase > PI {
            self.phase -= TAU;
        }

        PllReading { frequency, lock }
    }

    /// Current oscillator phase, always in (-pi, pi].
    pub fn phase(&self) -> f64 {
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn test_phase_stays_wrapped_on_random_input() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut tracker = CarrierTracker::new(8000, 1750, 200, false);
        let mut squared = CarrierTracker::new(8000, 2100, 30, true);
        for _ in 0..20_000 {
            let sample: f64 = rng.gen_range(-1.0..1.0);
            tracker.advance(sample);
            squared.advance(sample);
            assert!(tracker.phase() > -PI && tracker.phase() <= PI);
            assert!(squared.phase() > -PI && squared.phase() <= PI);
        }
    }

    #[test]
    fn test_tracks_offset_carrier() {
        // A tone 60 Hz above nominal should pull the correction toward +60.
        let sample_rate = 8000u32;
        let mut tracker = CarrierTracker::new(sample_rate, 1750, 200, false);
        let step = TAU * 1810.0 / sample_rate as f64;
        let mut frequency = 0.0;
        for n in 0..sample_rate as usize {
            frequency = tracker.advance((step * n as f64).cos()).frequency;
        }
        assert!(
            (frequency - 60.0).abs() < 10.0,
            "correction settled at {} Hz",
            frequency
        );
    }

    #[test]
    fn test_correction_sign_follows_tone() {
        let sample_rate = 8000u32;
        let mut low = CarrierTracker::new(sample_rate, 1750, 200, false);
        let mut high = CarrierTracker::new(sample_rate, 1750, 200, false);
        let step_low = TAU * 1650.0 / sample_rate as f64;
        let step_high = TAU * 1850.0 / sample_rate as f64;
        let (mut f_low, mut f_high) = (0.0, 0.0);
        for n in 0..4000usize {
            f_low = low.advance((step_low * n as f64).cos()).frequency;
            f_high = high.advance((step_high * n as f64).cos()).frequency;
        }
        assert!(f_low < 0.0, "below-center tone gave {}", f_low);
        assert!(f_high > 0.0, "above-center tone gave {}", f_high);
    }

    #[test]
    fn test_lock_low_on_carrier_high_on_noise() {
        let sample_rate = 8000u32;
        let mut on_tone = CarrierTracker::new(sample_rate, 2100, 30, true);
        let step = TAU * 2100.0 / sample_rate as f64;
        let mut lock_tone = 0.0;
        for n in 0..sample_rate as usize {
            lock_tone = on_tone.advance((step * n as f64).cos()).lock;
        }

        let mut on_noise = CarrierTracker::new(sample_rate, 2100, 30, true);
        let mut rng = StdRng::seed_from_u64(21);
        let mut lock_noise = 0.0;
        for _ in 0..sample_rate as usize {
            lock_noise = on_noise.advance(rng.gen_range(-1.0..1.0)).lock;
        }

        assert!(lock_tone < 10.0, "tone lock quality {}", lock_tone);
        assert!(lock_noise > 10.0, "noise lock quality {}", lock_noise);
    }
}
