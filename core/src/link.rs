//! Call establishment and the byte-level duplex link
//!
//! The link state machine drives the detectors and the generator automaton
//! through the handshake: the originator waits on the answer tone, both
//! sides exchange the capability menu until each has seen an identical
//! copy twice, and the originator's three-byte preamble releases the
//! answerer into the data state. Received bytes are delivered through an
//! mpsc channel, one byte at a time, in order.
//!
//! Capture and render callbacks may arrive on different threads; all link
//! state lives behind a single mutex, so `hangup` can never race a
//! callback mid-execution.

use crate::detector::{AnswerToneDetector, FskDetector};
use crate::error::{ModemError, Result};
use crate::framing::{frame_bits, Deframer};
use crate::generator::ToneGenerator;
use crate::{ANSWER_FREQ, ORIGINATE_FREQ};
use log::debug;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// The fixed 60-bit capability menu: ten idle mark bits, then the five
/// framed bytes E0 C1 05 10 90. Exchanged verbatim by both sides; treated
/// as an opaque protocol constant, reproduced bit for bit.
const CALL_MENU: [u8; 60] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, //
    0, 0, 0, 0, 0, 0, 1, 1, 1, 1, //
    0, 1, 0, 0, 0, 0, 0, 1, 1, 1, //
    0, 1, 0, 1, 0, 0, 0, 0, 0, 1, //
    0, 0, 0, 0, 0, 1, 0, 0, 0, 1, //
    0, 0, 0, 0, 0, 1, 0, 0, 1, 1,
];

/// A candidate menu is exactly this many pending bytes.
const MENU_BYTES: usize = 5;

/// Phase of the call-establishment handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Originator: listening for the answer tone while silent.
    WaitForAnswer,
    /// Originator: repeating the call menu, waiting for the joint menu.
    SendCallMenu,
    /// Answerer: transmitting the answer tone, waiting for the call menu.
    WaitForCallMenu,
    /// Answerer: repeating its menu until the far side stops.
    SendJointMenu,
    /// Byte-level duplex link is up.
    Data,
    /// Terminal until the next call or answer.
    Hangup,
}

/// Top-level duplex modem handle. Cloneable; all clones share one link.
#[derive(Clone)]
pub struct Modem {
    inner: Arc<Mutex<Link>>,
}

impl Modem {
    /// Create a modem for the given capture/render sample rate. Decoded
    /// bytes arrive on the returned channel.
    pub fn new(sample_rate: u32) -> (Self, Receiver<u8>) {
        let (byte_tx, byte_rx) = mpsc::channel();
        let modem = Self {
            inner: Arc::new(Mutex::new(Link::new(sample_rate, byte_tx))),
        };
        (modem, byte_rx)
    }

    /// Start a call as the originating side.
    pub fn call(&self) {
        self.inner.lock().unwrap().call();
    }

    /// Start a call as the answering side.
    pub fn answer(&self) {
        self.inner.lock().unwrap().answer();
    }

    /// Tear the link down. Safe to invoke concurrently with capture and
    /// render callbacks.
    pub fn hangup(&self) {
        self.inner.lock().unwrap().hangup();
    }

    /// Current handshake phase.
    pub fn state(&self) -> CallState {
        self.inner.lock().unwrap().state
    }

    /// Capture-side push: a raw byte buffer in 4-byte PCM strides.
    pub fn push_samples(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().receive_samples(bytes);
    }

    /// Render-side pull: always fills `out` completely, with silence when
    /// no call is in progress.
    pub fn pull_samples(&self, out: &mut [f32]) {
        self.inner.lock().unwrap().render_samples(out);
    }

    /// Frame and enqueue bytes for transmission. Rejected with
    /// [`ModemError::NotConnected`] until the link reaches [`CallState::Data`].
    pub fn send_bytes(&self, data: &[u8]) -> Result<()> {
        self.inner.lock().unwrap().send_bytes(data)
    }
}

struct Link {
    sample_rate: u32,
    state: CallState,
    answer_detector: Option<AnswerToneDetector>,
    fsk_detector: Option<FskDetector>,
    generator: Option<ToneGenerator>,
    deframer: Deframer,
    candidate_menu: Option<Vec<u8>>,
    byte_tx: Sender<u8>,
}

impl Link {
    fn new(sample_rate: u32, byte_tx: Sender<u8>) -> Self {
        Self {
            sample_rate,
            state: CallState::Hangup,
            answer_detector: None,
            fsk_detector: None,
            generator: None,
            deframer: Deframer::new(),
            candidate_menu: None,
            byte_tx,
        }
    }

    fn reset(&mut self) {
        self.answer_detector = None;
        self.fsk_detector = None;
        self.generator = None;
        self.deframer.reset();
        self.candidate_menu = None;
    }

    fn call(&mut self) {
        self.reset();
        self.state = CallState::WaitForAnswer;
        // Listen for the answer tone first; the FSK detector takes over
        // on the answerer's channel once the tone is gone.
        self.answer_detector = Some(AnswerToneDetector::new(self.sample_rate));
        self.fsk_detector = Some(FskDetector::new(self.sample_rate, ANSWER_FREQ));
        self.generator = Some(ToneGenerator::new(self.sample_rate, ORIGINATE_FREQ));
        debug!("originating call, waiting for answer tone");
    }

    fn answer(&mut self) {
        self.reset();
        self.state = CallState::WaitForCallMenu;
        self.fsk_detector = Some(FskDetector::new(self.sample_rate, ORIGINATE_FREQ));
        let mut generator = ToneGenerator::new(self.sample_rate, ANSWER_FREQ);
        generator.send_answer_tone();
        self.generator = Some(generator);
        debug!("answering call, sending answer tone");
    }

    fn hangup(&mut self) {
        self.state = CallState::Hangup;
        self.reset();
        debug!("hung up");
    }

    fn render_samples(&mut self, out: &mut [f32]) {
        match self.generator.as_mut() {
            Some(generator) => generator.fill(out),
            None => out.fill(0.0),
        }
    }

    fn receive_samples(&mut self, bytes: &[u8]) {
        if let Some(detector) = self.answer_detector.as_mut() {
            let Some(tail) = detector.process(bytes) else {
                return;
            };
            self.answer_detector = None;
            self.state = CallState::SendCallMenu;
            debug!("answer tone handled, repeating call menu");
            if let Some(generator) = self.generator.as_mut() {
                generator.repeat(true, &CALL_MENU);
            }
            // Hand the unprocessed tail straight to the bit detector so
            // no samples are lost at the handover.
            self.decode_bits(&bytes[tail..]);
            return;
        }
        self.decode_bits(bytes);
    }

    fn decode_bits(&mut self, bytes: &[u8]) {
        let Some(detector) = self.fsk_detector.as_mut() else {
            return;
        };
        let bits = detector.process(bytes);
        for bit in bits {
            if self.deframer.push_bit(bit) {
                self.byte_framed();
            }
        }
    }

    fn byte_framed(&mut self) {
        match self.state {
            CallState::SendCallMenu => {
                if self.confirm_menu() {
                    self.state = CallState::Data;
                    debug!("joint menu confirmed, entering data state");
                    if let Some(generator) = self.generator.as_mut() {
                        generator.prepare_for_data(true);
                    }
                }
            }
            CallState::WaitForCallMenu => {
                if self.confirm_menu() {
                    self.state = CallState::SendJointMenu;
                    debug!("call menu confirmed, repeating joint menu");
                    if let Some(generator) = self.generator.as_mut() {
                        generator.repeat(false, &CALL_MENU);
                    }
                }
            }
            CallState::SendJointMenu => {
                // Three trailing zero bytes are the originator's preamble:
                // it has stopped repeating and the line is ours.
                let pending = self.deframer.pending();
                if pending.len() >= 3 && pending[pending.len() - 3..].iter().all(|&b| b == 0) {
                    self.deframer.clear_pending();
                    self.state = CallState::Data;
                    debug!("far side stopped repeating, entering data state");
                    if let Some(generator) = self.generator.as_mut() {
                        generator.prepare_for_data(false);
                    }
                }
            }
            CallState::Data => {
                for byte in self.deframer.take_pending() {
                    // Receiver dropped just means nobody is listening.
                    let _ = self.byte_tx.send(byte);
                }
            }
            CallState::WaitForAnswer | CallState::Hangup => {}
        }
    }

    /// A candidate menu advances the handshake only when the identical
    /// five bytes have been received twice in a row; a mismatch replaces
    /// the stored candidate and keeps waiting, so one corrupted capture
    /// can never advance the state.
    fn confirm_menu(&mut self) -> bool {
        let pending = self.deframer.pending();
        let is_candidate = pending.len() == MENU_BYTES
            && pending[0] == 0xE0
            && pending[1] == 0xC1
            && pending[4] & 0x80 == 0x80;
        if !is_candidate {
            return false;
        }
        if self.candidate_menu.as_deref() == Some(pending) {
            self.deframer.clear_pending();
            return true;
        }
        self.candidate_menu = Some(pending.to_vec());
        self.deframer.clear_pending();
        false
    }

    fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        if self.state != CallState::Data {
            return Err(ModemError::NotConnected);
        }
        let generator = self.generator.as_ref().ok_or(ModemError::NotStarted)?;
        generator.enqueue_bits(&frame_bits(data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_bytes_rejected_before_data_state() {
        let (modem, _rx) = Modem::new(8000);
        assert!(matches!(modem.send_bytes(b"HI"), Err(ModemError::NotConnected)));

        modem.call();
        assert_eq!(modem.state(), CallState::WaitForAnswer);
        assert!(matches!(modem.send_bytes(b"HI"), Err(ModemError::NotConnected)));
    }

    #[test]
    fn test_initial_state_is_hangup() {
        let (modem, _rx) = Modem::new(8000);
        assert_eq!(modem.state(), CallState::Hangup);
    }

    #[test]
    fn test_pull_is_silent_when_idle() {
        let (modem, _rx) = Modem::new(8000);
        let mut out = vec![1.0f32; 256];
        modem.pull_samples(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_hangup_resets_roles() {
        let (modem, _rx) = Modem::new(8000);
        modem.answer();
        assert_eq!(modem.state(), CallState::WaitForCallMenu);
        modem.hangup();
        assert_eq!(modem.state(), CallState::Hangup);

        let mut out = vec![1.0f32; 64];
        modem.pull_samples(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_answerer_transmits_answer_tone() {
        let (modem, _rx) = Modem::new(8000);
        modem.answer();
        let mut pad = vec![0.0f32; 16];
        modem.pull_samples(&mut pad);
        let mut out = vec![0.0f32; 1024];
        modem.pull_samples(&mut out);
        assert!(out.iter().any(|&s| s.abs() > 0.5));
    }

    #[test]
    fn test_menu_constant_frames_to_expected_bytes() {
        let mut deframer = Deframer::new();
        let mut framed = Vec::new();
        for &bit in CALL_MENU.iter() {
            if deframer.push_bit(bit) {
                framed = deframer.pending().to_vec();
            }
        }
        assert_eq!(framed, vec![0xE0, 0xC1, 0x05, 0x10, 0x90]);
        assert_eq!(framed[4] & 0x80, 0x80);
    }

    #[test]
    fn test_single_corrupted_menu_does_not_confirm() {
        let (tx, _rx) = mpsc::channel();
        let mut link = Link::new(8000, tx);
        link.answer();

        // First clean copy: stored as candidate, no confirmation.
        for &bit in CALL_MENU.iter() {
            if link.deframer.push_bit(bit) {
                link.byte_framed();
            }
        }
        assert_eq!(link.state, CallState::WaitForCallMenu);
        assert!(link.candidate_menu.is_some());

        // Corrupted copy (one data bit flipped in the last byte).
        let mut corrupted = CALL_MENU;
        corrupted[52] ^= 1;
        for &bit in corrupted.iter() {
            if link.deframer.push_bit(bit) {
                link.byte_framed();
            }
        }
        assert_eq!(link.state, CallState::WaitForCallMenu);

        // Two identical copies in a row confirm.
        for _ in 0..2 {
            for &bit in CALL_MENU.iter() {
                if link.deframer.push_bit(bit) {
                    link.byte_framed();
                }
            }
        }
        assert_eq!(link.state, CallState::SendJointMenu);
    }

    #[test]
    fn test_joint_menu_waits_for_trailing_zeros() {
        let (tx, _rx) = mpsc::channel();
        let mut link = Link::new(8000, tx);
        link.answer();
        link.state = CallState::SendJointMenu;

        // Menu repeats from the far side do not advance the state.
        for &bit in CALL_MENU.iter() {
            if link.deframer.push_bit(bit) {
                link.byte_framed();
            }
        }
        assert_eq!(link.state, CallState::SendJointMenu);

        // The three-byte zero preamble does.
        for &bit in frame_bits(&[0x00, 0x00, 0x00]).iter() {
            if link.deframer.push_bit(bit) {
                link.byte_framed();
            }
        }
        assert_eq!(link.state, CallState::Data);
    }
}
