//! Float capture to PCM16 conversion
//!
//! The scale is 32768 in both directions, rounded to nearest, with the
//! positive edge clamped to 32767. Round-tripping any in-range sample stays
//! within half a quantization step; only inputs at or beyond positive full
//! scale lose more, because 32768 itself does not exist in an i16.

use crate::audio::AudioFrame;
use crate::{Error, Result};

/// Convert float samples in [-1.0, 1.0] to signed 16-bit PCM.
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let scaled = (sample * 32_768.0).round().clamp(-32_768.0, 32_767.0);
            #[allow(clippy::cast_possible_truncation)]
            let encoded = scaled as i16;
            encoded
        })
        .collect()
}

/// Convert signed 16-bit PCM back to float samples in [-1.0, 1.0).
#[must_use]
pub fn decode_pcm16(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| f32::from(sample) / 32_768.0)
        .collect()
}

/// Generate `duration_secs` of PCM16 silence as little-endian bytes.
#[must_use]
pub fn silence_bytes(duration_secs: f64, sample_rate: u32) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = (duration_secs.max(0.0) * f64::from(sample_rate)) as usize;
    vec![0u8; count * 2]
}

/// Accumulates captured float samples into fixed-size PCM16 frames.
///
/// The window size must be a power of two so downstream FFT-based consumers
/// can use frames directly. The encoder never resamples; callers must feed
/// it samples already at `sample_rate`.
#[derive(Debug)]
pub struct CaptureEncoder {
    window: usize,
    sample_rate: u32,
    pending: Vec<i16>,
}

impl CaptureEncoder {
    /// Create an encoder emitting `window`-sample frames at `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `window` is zero or not a power of two, or
    /// if `sample_rate` is zero.
    pub fn new(window: usize, sample_rate: u32) -> Result<Self> {
        if !window.is_power_of_two() {
            return Err(Error::Config(format!(
                "capture window must be a power of two, got {window}"
            )));
        }
        if sample_rate == 0 {
            return Err(Error::Config("sample rate must be nonzero".to_string()));
        }
        Ok(Self {
            window,
            sample_rate,
            pending: Vec::with_capacity(window),
        })
    }

    /// Append captured samples, returning every completed frame.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend(encode_pcm16(samples));

        let mut frames = Vec::new();
        while self.pending.len() >= self.window {
            let rest = self.pending.split_off(self.window);
            let full = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(full, self.sample_rate));
        }
        frames
    }

    /// Emit the trailing partial window, if any.
    ///
    /// Called at end of capture so no audio is silently discarded.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let samples = std::mem::take(&mut self.pending);
        Some(AudioFrame::new(samples, self.sample_rate))
    }

    /// Samples buffered but not yet emitted.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Configured window size in samples.
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- scalar conversion ----

    #[test]
    fn full_scale_positive_does_not_overflow() {
        assert_eq!(encode_pcm16(&[1.0]), vec![32_767]);
    }

    #[test]
    fn full_scale_negative_uses_full_range() {
        assert_eq!(encode_pcm16(&[-1.0]), vec![-32_768]);
    }

    #[test]
    fn out_of_range_input_is_clamped() {
        assert_eq!(encode_pcm16(&[2.5]), vec![32_767]);
        assert_eq!(encode_pcm16(&[-7.0]), vec![-32_768]);
    }

    #[test]
    fn zero_stays_zero() {
        assert_eq!(encode_pcm16(&[0.0]), vec![0]);
        assert_eq!(decode_pcm16(&[0]), vec![0.0]);
    }

    #[test]
    fn encoding_rounds_to_nearest() {
        // 0.25 * 32768 is exactly 8192; three quarters of a step above it
        // must round up, not truncate down.
        assert_eq!(encode_pcm16(&[0.25]), vec![8192]);
        assert_eq!(encode_pcm16(&[0.25 + 0.75 / 32_768.0]), vec![8193]);
    }

    #[test]
    fn round_trip_error_within_one_lsb() {
        let inputs = [-0.759, -0.25, -0.001, 0.001, 0.25, 0.499, 0.903];
        let encoded = encode_pcm16(&inputs);
        let decoded = decode_pcm16(&encoded);
        for (a, b) in inputs.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= 1.0 / 32_768.0, "{a} vs {b}");
        }
    }

    // ---- silence ----

    #[test]
    fn silence_is_zeroed_pcm() {
        let bytes = silence_bytes(0.5, 24_000);
        assert_eq!(bytes.len(), 24_000); // 12000 samples * 2 bytes
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn negative_silence_duration_is_empty() {
        assert!(silence_bytes(-1.0, 24_000).is_empty());
    }

    // ---- encoder windowing ----

    #[test]
    fn rejects_non_power_of_two_window() {
        assert!(CaptureEncoder::new(1000, 24_000).is_err());
        assert!(CaptureEncoder::new(0, 24_000).is_err());
        assert!(CaptureEncoder::new(1024, 24_000).is_ok());
    }

    #[test]
    fn emits_one_frame_per_full_window() {
        let mut encoder = CaptureEncoder::new(8, 24_000).unwrap();
        let frames = encoder.push(&[0.1; 20]);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.samples.len() == 8));
        assert_eq!(encoder.pending_len(), 4);
    }

    #[test]
    fn partial_window_waits_for_more_input() {
        let mut encoder = CaptureEncoder::new(8, 24_000).unwrap();
        assert!(encoder.push(&[0.1; 5]).is_empty());
        let frames = encoder.push(&[0.1; 3]);
        assert_eq!(frames.len(), 1);
        assert_eq!(encoder.pending_len(), 0);
    }

    #[test]
    fn flush_emits_trailing_partial() {
        let mut encoder = CaptureEncoder::new(8, 24_000).unwrap();
        encoder.push(&[0.1; 5]);
        let frame = encoder.flush().unwrap();
        assert_eq!(frame.samples.len(), 5);
        assert!(encoder.flush().is_none());
    }

    #[test]
    fn flush_when_empty_is_none() {
        let mut encoder = CaptureEncoder::new(8, 24_000).unwrap();
        assert!(encoder.flush().is_none());
    }
}
