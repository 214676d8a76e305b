//! Answer-tone and binary-FSK detectors
//!
//! Both detectors wrap a [`CarrierTracker`](crate::pll::CarrierTracker) and
//! consume raw capture buffers in 4-byte PCM strides. Results come back as
//! plain values: the answer-tone detector reports the byte offset of the
//! unprocessed buffer tail when it fires, the FSK detector returns the bits
//! it clocked out of the stream.

use crate::pcm::unpack_samples;
use crate::pll::CarrierTracker;
use crate::{ANSWER_TONE_FREQ, BAUD_RATE};

/// Lock-quality threshold shared by both detectors.
const LOCK_THRESHOLD: f64 = 10.0;

/// Answer-tone tracking deviation bound (Hz)
const ANSWER_TONE_DEVIATION: u32 = 30;

/// FSK tracking deviation bound (Hz)
const FSK_DEVIATION: u32 = 200;

/// Transitions further apart than this many bit periods re-arm the bit
/// clock instead of updating it.
const MAX_PERIODS_PER_TRANSITION: f64 = 10.0;

/// Upper tolerance on the implied bit period before a transition is
/// treated as an unreliable sync point.
const PERIOD_UPPER_TOLERANCE: f64 = 1.12;

/// Lower tolerance on the implied bit period; anything shorter is a glitch
/// and leaves the timing state untouched.
const PERIOD_LOWER_TOLERANCE: f64 = 0.88;

/// Detects the 2100 Hz amplitude-modulated answer tone.
///
/// The tone inverts polarity every 450 ms, so the tracker squares its input
/// and runs at the doubled carrier. Detection fires after half a second of
/// consecutive samples with lock quality below threshold; any sample at or
/// above threshold resets the run to zero, so a transient dip is never
/// enough. After firing the detector stays quiet for the rest of the call.
pub struct AnswerToneDetector {
    tracker: CarrierTracker,
    half_second: i64,
    run_length: i64,
    fired: bool,
}

impl AnswerToneDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            tracker: CarrierTracker::new(sample_rate, ANSWER_TONE_FREQ, ANSWER_TONE_DEVIATION, true),
            half_second: sample_rate as i64 / 2,
            run_length: -1,
            fired: false,
        }
    }

    /// Feed a capture buffer. On detection, returns the byte offset where
    /// the unprocessed tail of `bytes` begins so the caller can hand the
    /// remainder to the next consumer without dropping samples.
    pub fn process(&mut self, bytes: &[u8]) -> Option<usize> {
        if self.fired {
            return None;
        }
        for (offset, sample) in unpack_samples(bytes) {
            let reading = self.tracker.advance(sample);
            if reading.lock < LOCK_THRESHOLD {
                self.run_length += 1;
                if self.run_length > self.half_second {
                    self.fired = true;
                    return Some(offset);
                }
            } else {
                self.run_length = 0;
            }
        }
        None
    }
}

/// Recovers a 300-baud bit stream from mark/space tones around a carrier.
///
/// The bit value is the sign of the tracker's frequency correction
/// (below-center tone = 1). The bit clock is self-recovered: an adaptive
/// period estimate starts at the nominal sample_rate/300 and is nudged by
/// tone transitions whose implied period lands within tolerance. The clock
/// stays disarmed until the first transition is seen.
pub struct FskDetector {
    tracker: CarrierTracker,
    nominal_period: i64,
    period: f64,
    samples_since_transition: i64,
    samples_since_bit: i64,
    last_bit: u8,
}

impl FskDetector {
    pub fn new(sample_rate: u32, frequency: u32) -> Self {
        let nominal_period = (sample_rate / BAUD_RATE) as i64;
        Self {
            tracker: CarrierTracker::new(sample_rate, frequency, FSK_DEVIATION, false),
            nominal_period,
            period: nominal_period as f64,
            samples_since_transition: -1,
            samples_since_bit: -1,
            last_bit: 1,
        }
    }

    /// Feed a capture buffer, returning the bits clocked out of it.
    pub fn process(&mut self, bytes: &[u8]) -> Vec<u8> {
        let mut bits = Vec::new();
        for (_, sample) in unpack_samples(bytes) {
            self.step(sample, &mut bits);
        }
        bits
    }

    /// Current adaptive bit period estimate in samples.
    pub fn bit_period(&self) -> f64 {
        self.period
    }

    fn step(&mut self, sample: f64, bits: &mut Vec<u8>) {
        let reading = self.tracker.advance(sample);
        let bit: u8 = if reading.frequency < 0.0 { 1 } else { 0 };

        if self.samples_since_bit as f64 >= self.period {
            bits.push(bit);
            self.samples_since_bit = 0;
        } else if self.samples_since_bit >= 0 {
            self.samples_since_bit += 1;
        }

        if bit != self.last_bit {
            self.last_bit = bit;
            let elapsed = self.samples_since_transition as f64;
            let periods = (elapsed / self.period).round();
            let implied_period = elapsed / periods;
            if self.samples_since_transition < 0
                || periods > MAX_PERIODS_PER_TRANSITION
                || implied_period > self.nominal_period as f64 * PERIOD_UPPER_TOLERANCE
            {
                // New, unreliable sync point: re-phase the bit clock to the
                // middle of the period without trusting the timing.
                self.samples_since_transition = 0;
                self.samples_since_bit = (self.period / 2.0) as i64;
            } else if implied_period > self.nominal_period as f64 * PERIOD_LOWER_TOLERANCE {
                self.period = (3.0 * self.period + implied_period) / 4.0;
                self.samples_since_transition = 0;
                self.samples_since_bit = (self.period / 2.0) as i64;
            }
            // Shorter than tolerance: noise glitch, keep accumulating.
        } else if self.samples_since_transition >= 0 {
            self.samples_since_transition += 1;
        }
    }
}
