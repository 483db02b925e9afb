//! Typed audio frame passed from the capture encoder to the transport chunker.

/// A contiguous block of mono PCM16 samples at a known sample rate.
///
/// Produced one capture window at a time; the sample count is the encoder's
/// window size except for a trailing flush, which may be shorter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Mono signed 16-bit samples.
    pub samples: Vec<i16>,
    /// Sample rate in Hz (e.g. 24000).
    pub sample_rate: u32,
}

impl AudioFrame {
    #[must_use]
    pub const fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of this frame in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// True if the frame contains no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Serialize samples as little-endian bytes, two per sample.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Parse little-endian PCM16 bytes into a frame.
    ///
    /// A trailing odd byte cannot be half a sample and is rejected.
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if `bytes` has odd length.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> crate::Result<Self> {
        if bytes.len() % 2 != 0 {
            return Err(crate::Error::Audio(format!(
                "pcm16 payload has odd length {}",
                bytes.len()
            )));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self::new(samples, sample_rate))
    }
}
