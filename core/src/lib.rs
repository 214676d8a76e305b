//! Audio-coupled data modem: a byte-stream link over a voice-grade channel
//!
//! Implements a single fixed scheme: 300-baud binary FSK with start/stop
//! framing, a 2100 Hz amplitude-modulated answer tone, and a capability-menu
//! handshake that decides which side transmits first on which carrier.
//! Detection is PLL-based and self-clocking; no external timing reference
//! is required.

pub mod detector;
pub mod error;
pub mod filter;
pub mod framing;
pub mod generator;
pub mod link;
pub mod pcm;
pub mod pll;

pub use error::{ModemError, Result};
pub use link::{CallState, Modem};

// Configuration constants
pub const BAUD_RATE: u32 = 300;

/// Carrier frequency of the originating side's data channel (Hz)
pub const ORIGINATE_FREQ: u32 = 1080;

/// Carrier frequency of the answering side's data channel (Hz)
pub const ANSWER_FREQ: u32 = 1750;

/// Mark/space tones sit this far below/above the channel carrier (Hz)
pub const FSK_SHIFT: u32 = 100;

/// Answer-tone carrier frequency (Hz)
pub const ANSWER_TONE_FREQ: u32 = 2100;

/// Amplitude-modulation rate of the answer tone (Hz)
pub const ANSWER_TONE_AM_FREQ: u32 = 15;

/// Start bit + 8 data bits (LSB first) + stop bit
pub const BITS_PER_FRAME: u32 = 10;

/// Inbound PCM stride: one little-endian i16 sample per 4 bytes
/// (one channel of an interleaved two-channel 16-bit stream)
pub const PCM_FRAME_STRIDE: usize = 4;
