//! PCM byte-stream conversion
//!
//! The capture side delivers raw byte buffers in 4-byte strides: the first
//! two bytes of each stride are one little-endian i16 sample, the other two
//! belong to the unused channel of an interleaved stereo stream. The render
//! side produces mono f32 samples; `pack_samples` is the inverse used by
//! loopback tooling and tests.

use crate::PCM_FRAME_STRIDE;

/// Iterate `(byte_offset, normalized_sample)` over a raw capture buffer.
/// A ragged tail shorter than one stride is ignored.
pub fn unpack_samples(bytes: &[u8]) -> impl Iterator<Item = (usize, f64)> + '_ {
    bytes
        .chunks_exact(PCM_FRAME_STRIDE)
        .enumerate()
        .map(|(n, frame)| {
            let raw = i16::from_le_bytes([frame[0], frame[1]]);
            (n * PCM_FRAME_STRIDE, raw as f64 / 32768.0)
        })
}

/// Pack mono f32 samples into the 4-byte-stride capture format.
pub fn pack_samples(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * PCM_FRAME_STRIDE);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let raw = (clamped * 32767.0) as i16;
        bytes.extend_from_slice(&raw.to_le_bytes());
        bytes.extend_from_slice(&[0, 0]);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_stride_and_scaling() {
        // Two strides: 0x4000 (= 0.5) and -0x4000 (= -0.5), second channel junk
        let bytes = [0x00, 0x40, 0xAA, 0xBB, 0x00, 0xC0, 0xCC, 0xDD];
        let samples: Vec<_> = unpack_samples(&bytes).collect();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].0, 0);
        assert!((samples[0].1 - 0.5).abs() < 1e-9);
        assert_eq!(samples[1].0, 4);
        assert!((samples[1].1 + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unpack_ignores_ragged_tail() {
        let bytes = [0x00, 0x40, 0x00, 0x00, 0x12, 0x34];
        assert_eq!(unpack_samples(&bytes).count(), 1);
    }

    #[test]
    fn test_pack_unpack_round_trip() {
        let samples = [0.0f32, 0.25, -0.25, 0.999, -0.999];
        let bytes = pack_samples(&samples);
        assert_eq!(bytes.len(), samples.len() * PCM_FRAME_STRIDE);
        for ((_, unpacked), original) in unpack_samples(&bytes).zip(samples.iter()) {
            assert!((unpacked - *original as f64).abs() < 1e-3);
        }
    }

    #[test]
    fn test_pack_clamps_out_of_range() {
        let bytes = pack_samples(&[2.0, -2.0]);
        let samples: Vec<_> = unpack_samples(&bytes).map(|(_, s)| s).collect();
        assert!(samples[0] > 0.99 && samples[0] <= 1.0);
        assert!(samples[1] < -0.99 && samples[1] >= -1.0);
    }
}
