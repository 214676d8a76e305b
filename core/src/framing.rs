//! Asynchronous start/stop byte framing
//!
//! Each byte travels as 10 bits: a 0 start bit, 8 data bits LSB first, and
//! a 1 stop bit. Deframing is a sliding 10-bit window over the raw bit
//! stream, so it self-resynchronizes after every successful extraction and
//! rejects the idle mark line state outright.

/// Ten consecutive mark bits: the idle line, never a frame.
const IDLE_REGISTER: u16 = 0x3FF;

/// Start (bit 0) and stop (bit 9) positions of the window.
const FRAME_MASK: u16 = 0x201;

/// Stop bit set, start bit clear.
const FRAME_MATCH: u16 = 0x200;

use crate::BITS_PER_FRAME;

/// Frame a byte sequence into its transmission bit stream.
pub fn frame_bits(data: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(data.len() * BITS_PER_FRAME as usize);
    for &byte in data {
        bits.push(0);
        for j in 0..8 {
            bits.push((byte >> j) & 1);
        }
        bits.push(1);
    }
    bits
}

/// Sliding-window deframer with a pending-byte buffer.
///
/// The newest bit enters the high end of the register. When the register
/// is all mark the pending buffer is cleared (idle tone is not data); when
/// at least 10 bits have accumulated and the start/stop positions line up,
/// a byte is extracted and the search re-arms.
#[derive(Debug, Default)]
pub struct Deframer {
    register: u16,
    bits_seen: u32,
    pending: Vec<u8>,
}

impl Deframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock in one bit; returns true when a byte was framed into the
    /// pending buffer.
    pub fn push_bit(&mut self, bit: u8) -> bool {
        self.register = ((bit as u16) << 9) | (self.register >> 1);
        self.bits_seen += 1;
        if self.register == IDLE_REGISTER {
            self.pending.clear();
            self.bits_seen = 0;
            return false;
        }
        if self.register & FRAME_MASK == FRAME_MATCH && self.bits_seen >= 10 {
            self.bits_seen = 0;
            self.pending.push(((self.register >> 1) & 0xFF) as u8);
            return true;
        }
        false
    }

    /// Bytes framed so far and not yet consumed.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Drain the pending buffer in arrival order.
    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    pub fn reset(&mut self) {
        self.register = 0;
        self.bits_seen = 0;
        self.pending.clear();
    }
}
