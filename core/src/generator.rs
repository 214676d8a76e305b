//! Waveform-generation automaton
//!
//! A pull-based sample source built from replaceable sub-generators. The
//! automaton delegates each render request to the active sub-generator and
//! swaps in a queued replacement only when the active one reports finished,
//! so a command issued mid-waveform never introduces a discontinuity. A
//! sub-generator that declares itself ready-for-data falls through into a
//! continuous data modulator automatically, inheriting the automaton's
//! shared bit queue.

use std::collections::VecDeque;
use std::f64::consts::{PI, TAU};
use std::sync::{Arc, Mutex};

use crate::{ANSWER_TONE_AM_FREQ, ANSWER_TONE_FREQ, BAUD_RATE, FSK_SHIFT};

/// Menu bursts repeat the pattern this many times before pausing at a
/// completion boundary.
const BURST_REPETITIONS: u32 = 5;

/// Leading pause before the originator's first menu burst (ms)
const CALL_MENU_PAUSE_MS: u32 = 500;

/// Silence between the preamble and continuous data (ms)
const DATA_LEAD_IN_MS: u32 = 75;

/// The answer tone flips polarity every 9/20 of a second.
const INVERSION_NUMERATOR: u32 = 9;
const INVERSION_DENOMINATOR: u32 = 20;

/// Three isolated mark bits, each preceded by nine spaces: three framed
/// 0x00 bytes announcing that this side is done repeating its menu.
const PREAMBLE_BITS: [u8; 30] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 1, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 1, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 1,
];

/// Thread-safe FIFO of pending bits, shared between protocol-level
/// producers and the render-side consumer.
type BitQueue = Arc<Mutex<VecDeque<u8>>>;

/// Pull-based sample source driving one outgoing audio leg.
pub struct ToneGenerator {
    sample_rate: u32,
    freq_one: u32,
    freq_zero: u32,
    active: SubGenerator,
    queued: Option<SubGenerator>,
    data_bits: BitQueue,
}

impl ToneGenerator {
    /// `data_freq` is the channel carrier; mark and space sit at
    /// `data_freq - FSK_SHIFT` and `data_freq + FSK_SHIFT`.
    pub fn new(sample_rate: u32, data_freq: u32) -> Self {
        Self {
            sample_rate,
            freq_one: data_freq - FSK_SHIFT,
            freq_zero: data_freq + FSK_SHIFT,
            active: SubGenerator::Silence(SilenceGenerator),
            queued: None,
            data_bits: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue a switch to silence at the next completion boundary.
    pub fn silence(&mut self) {
        self.queued = Some(SubGenerator::Silence(SilenceGenerator));
    }

    /// Queue the answer-tone waveform.
    pub fn send_answer_tone(&mut self) {
        self.queued = Some(SubGenerator::AnswerTone(AnswerToneGenerator::new(self.sample_rate)));
    }

    /// Queue a repeated burst of `bits`, optionally preceded by a pause.
    pub fn repeat(&mut self, send_pause: bool, bits: &[u8]) {
        let pause_ms = if send_pause { CALL_MENU_PAUSE_MS } else { 0 };
        self.queued = Some(SubGenerator::Repeat(RepeatGenerator::new(
            self.sample_rate,
            self.freq_one,
            self.freq_zero,
            pause_ms,
            bits,
        )));
    }

    /// Queue the transition into continuous data mode: an optional
    /// preamble, a short gap, then automatic fallthrough to the data
    /// modulator.
    pub fn prepare_for_data(&mut self, send_preamble: bool) {
        self.queued = Some(SubGenerator::Preamble(PreambleGenerator::new(
            self.sample_rate,
            self.freq_one,
            self.freq_zero,
            send_preamble,
        )));
    }

    /// Append bits to the shared data queue. Callable from any thread at
    /// any time; the bits play once the continuous modulator is active.
    pub fn enqueue_bits(&self, bits: &[u8]) {
        self.data_bits.lock().unwrap().extend(bits.iter().copied());
    }

    /// Produce exactly `out.len()` samples, advancing the automaton
    /// through completion boundaries as needed.
    pub fn fill(&mut self, out: &mut [f32]) {
        let mut sent = 0;
        while sent < out.len() {
            let wrote = self.active.generate(&mut out[sent..]);
            sent += wrote;
            if self.active.is_done() {
                if let Some(next) = self.queued.take() {
                    self.active = next;
                    continue;
                }
                if self.active.ready_for_data() {
                    self.active = SubGenerator::Data(DataGenerator::new(
                        self.sample_rate,
                        self.freq_one,
                        self.freq_zero,
                        false,
                        Arc::clone(&self.data_bits),
                    ));
                    continue;
                }
            }
            if wrote == 0 {
                // Nothing queued and the active generator has nothing
                // left: pad the remainder with silence.
                out[sent..].fill(0.0);
                break;
            }
        }
    }
}

/// Closed set of sub-generator behaviors.
enum SubGenerator {
    Silence(SilenceGenerator),
    AnswerTone(AnswerToneGenerator),
    Repeat(RepeatGenerator),
    Preamble(PreambleGenerator),
    Data(DataGenerator),
}

impl SubGenerator {
    fn generate(&mut self, out: &mut [f32]) -> usize {
        match self {
            SubGenerator::Silence(g) => g.generate(out),
            SubGenerator::AnswerTone(g) => g.generate(out),
            SubGenerator::Repeat(g) => g.generate(out),
            SubGenerator::Preamble(g) => g.generate(out),
            SubGenerator::Data(g) => g.generate(out),
        }
    }

    fn is_done(&self) -> bool {
        match self {
            SubGenerator::Silence(_) => true,
            // The answer tone treats every filled block as a completed
            // unit so a queued replacement can take over between blocks.
            SubGenerator::AnswerTone(_) => true,
            SubGenerator::Repeat(g) => g.is_done(),
            SubGenerator::Preamble(g) => g.is_done(),
            SubGenerator::Data(g) => g.is_done(),
        }
    }

    fn ready_for_data(&self) -> bool {
        match self {
            SubGenerator::Preamble(g) => g.is_done(),
            _ => false,
        }
    }
}

/// Zeros forever; finished immediately, so it acts as a one-shot pad.
struct SilenceGenerator;

impl SilenceGenerator {
    fn generate(&mut self, out: &mut [f32]) -> usize {
        out.fill(0.0);
        out.len()
    }
}

/// The 2100 Hz answer tone, amplitude-modulated at 15 Hz and polarity-
/// inverted every 450 ms.
struct AnswerToneGenerator {
    carrier_step: f64,
    am_step: f64,
    samples_per_inversion: u64,
    sample_num: u64,
    inverted: bool,
}

impl AnswerToneGenerator {
    fn new(sample_rate: u32) -> Self {
        Self {
            carrier_step: TAU * ANSWER_TONE_FREQ as f64 / sample_rate as f64,
            am_step: TAU * ANSWER_TONE_AM_FREQ as f64 / sample_rate as f64,
            samples_per_inversion: (sample_rate * INVERSION_NUMERATOR / INVERSION_DENOMINATOR) as u64,
            sample_num: 0,
            inverted: false,
        }
    }

    fn generate(&mut self, out: &mut [f32]) -> usize {
        for slot in out.iter_mut() {
            let n = self.sample_num as f64;
            let mut value = (self.carrier_step * n).cos() * (1.0 + 0.2 * (self.am_step * n).cos()) / 1.2;
            if self.inverted {
                value = -value;
            }
            *slot = value as f32;
            self.sample_num += 1;
            if self.sample_num == self.samples_per_inversion {
                self.sample_num = 0;
                self.inverted = !self.inverted;
            }
        }
        out.len()
    }
}

/// Plays an optional leading pause, then a fixed bit pattern five times
/// per burst. The repetition counter wraps after each burst, so a repeat
/// generator left in place keeps bursting until it is hot-swapped; that is
/// what keeps the menu on the wire until the far side confirms it.
struct RepeatGenerator {
    modulator: DataGenerator,
    pause_samples: usize,
    repetitions: u32,
    pattern: Vec<u8>,
}

impl RepeatGenerator {
    fn new(sample_rate: u32, freq_one: u32, freq_zero: u32, pause_ms: u32, bits: &[u8]) -> Self {
        Self {
            modulator: DataGenerator::new(
                sample_rate,
                freq_one,
                freq_zero,
                true,
                Arc::new(Mutex::new(VecDeque::new())),
            ),
            pause_samples: (sample_rate * pause_ms / 1000) as usize,
            repetitions: 0,
            pattern: bits.to_vec(),
        }
    }

    fn is_done(&self) -> bool {
        self.pause_samples == 0 && self.modulator.is_done()
    }

    fn generate(&mut self, out: &mut [f32]) -> usize {
        let mut sent = 0;
        if self.pause_samples > 0 {
            let pad = out.len().min(self.pause_samples);
            out[..pad].fill(0.0);
            self.pause_samples -= pad;
            sent = pad;
            if sent == out.len() {
                return sent;
            }
        }

        while sent < out.len() && self.repetitions < BURST_REPETITIONS {
            if self.modulator.is_done() {
                self.modulator.enqueue(&self.pattern);
            }
            sent += self.modulator.generate(&mut out[sent..]);
            if self.modulator.is_done() {
                self.repetitions += 1;
            }
        }
        self.repetitions %= BURST_REPETITIONS;
        sent
    }
}

/// Optional 30-bit preamble followed by a fixed 75 ms gap. Reports
/// ready-for-data exactly when finished, which triggers the automaton's
/// fallthrough into continuous data mode.
struct PreambleGenerator {
    modulator: Option<DataGenerator>,
    pause_samples: usize,
}

impl PreambleGenerator {
    fn new(sample_rate: u32, freq_one: u32, freq_zero: u32, send_preamble: bool) -> Self {
        let modulator = if send_preamble {
            let generator = DataGenerator::new(
                sample_rate,
                freq_one,
                freq_zero,
                true,
                Arc::new(Mutex::new(VecDeque::new())),
            );
            generator.enqueue(&PREAMBLE_BITS);
            Some(generator)
        } else {
            None
        };
        Self {
            modulator,
            pause_samples: (sample_rate * DATA_LEAD_IN_MS / 1000) as usize,
        }
    }

    fn is_done(&self) -> bool {
        self.pause_samples == 0
    }

    fn generate(&mut self, out: &mut [f32]) -> usize {
        let mut sent = 0;
        if let Some(modulator) = self.modulator.as_mut() {
            sent = modulator.generate(out);
            if modulator.is_done() {
                self.modulator = None;
            }
        }
        let pad = (out.len() - sent).min(self.pause_samples);
        out[sent..sent + pad].fill(0.0);
        self.pause_samples -= pad;
        sent + pad
    }
}

/// Continuous FSK modulator: a phase accumulator alternating between the
/// mark and space phase increments, holding each bit for one bit period
/// and consuming the bit queue. With `stop_on_end` it finishes (and
/// returns short) once the queue drains and the current bit elapses;
/// without, it holds the last tone indefinitely (idle mark on startup).
struct DataGenerator {
    phase_delta_one: f64,
    phase_delta_zero: f64,
    phase: f64,
    stop_on_end: bool,
    samples_per_bit: u32,
    remaining_samples: u32,
    bits: BitQueue,
    current_bit: u8,
}

impl DataGenerator {
    fn new(sample_rate: u32, freq_one: u32, freq_zero: u32, stop_on_end: bool, bits: BitQueue) -> Self {
        Self {
            phase_delta_one: TAU * freq_one as f64 / sample_rate as f64,
            phase_delta_zero: TAU * freq_zero as f64 / sample_rate as f64,
            phase: 0.0,
            stop_on_end,
            samples_per_bit: sample_rate / BAUD_RATE,
            remaining_samples: 0,
            bits,
            current_bit: 1,
        }
    }

    fn is_done(&self) -> bool {
        self.remaining_samples == 0 && self.bits.lock().unwrap().is_empty()
    }

    fn enqueue(&self, bits: &[u8]) {
        self.bits.lock().unwrap().extend(bits.iter().copied());
    }

    fn generate(&mut self, out: &mut [f32]) -> usize {
        let mut sent = 0;
        while sent < out.len() {
            if self.remaining_samples == 0 {
                let mut queue = self.bits.lock().unwrap();
                if queue.is_empty() && self.stop_on_end {
                    return sent;
                }
                if let Some(bit) = queue.pop_front() {
                    self.current_bit = bit;
                }
                drop(queue);
                self.remaining_samples = self.samples_per_bit;
            }
            out[sent] = self.phase.cos() as f32;
            self.phase += if self.current_bit == 1 {
                self.phase_delta_one
            } else {
                self.phase_delta_zero
            };
            if self.phase > PI {
                self.phase -= TAU;
            }
            self.remaining_samples -= 1;
            sent += 1;
        }
        sent
    }
}
