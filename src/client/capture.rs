//! Microphone capture for the native client

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::{Error, Result};

/// Captures mono f32 audio from the default input device.
///
/// The device is opened at the requested rate when it offers a mono
/// configuration there; otherwise it falls back to the device default and
/// the caller bridges the rate with a [`RateAdapter`]. Multi-channel input
/// is downmixed in the callback.
pub struct MicCapture {
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl MicCapture {
    /// Open the default input device, preferring mono at `target_rate`.
    ///
    /// # Errors
    ///
    /// Returns error if no input device is available or it reports no
    /// usable configuration.
    pub fn new(target_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let exact = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(target_rate)
                    && c.max_sample_rate() >= SampleRate(target_rate)
            });

        let config = match exact {
            Some(c) => c.with_sample_rate(SampleRate(target_rate)).config(),
            None => device
                .default_input_config()
                .map_err(|e| Error::Audio(e.to_string()))?
                .config(),
        };

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio.
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let channels = usize::from(self.config.channels);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        if channels == 1 {
                            buf.extend_from_slice(data);
                        } else {
                            buf.extend(downmix(data, channels));
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "capture stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("capture started");
        Ok(())
    }

    /// Stop capturing audio.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("capture stopped");
        }
    }

    /// Samples captured since the last call, clearing the buffer.
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Samples captured so far, without clearing.
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    /// Drop everything captured so far.
    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    /// Whether a stream is currently running.
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Rate the device actually runs at.
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

/// Average interleaved frames down to mono.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Render mono PCM16 samples as WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Converts capture-rate mono audio to the engine rate.
///
/// Passthrough when the rates already match; no rubato session is created.
/// Otherwise input accumulates until a full block is available and any
/// remainder waits for the next call.
pub struct RateAdapter {
    resampler: Option<FastFixedIn<f32>>,
    input: Vec<f32>,
    block: usize,
    output: Vec<Vec<f32>>,
}

impl RateAdapter {
    /// Create an adapter from `capture_rate` to `engine_rate` processing
    /// `block` input samples per resampler call.
    ///
    /// # Errors
    ///
    /// Returns error if the resampler rejects the rate ratio.
    pub fn new(capture_rate: u32, engine_rate: u32, block: usize) -> Result<Self> {
        if capture_rate == engine_rate {
            return Ok(Self {
                resampler: None,
                input: Vec::new(),
                block,
                output: Vec::new(),
            });
        }

        let ratio = f64::from(engine_rate) / f64::from(capture_rate);
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, block, 1)
            .map_err(|e| Error::Audio(format!("resampler init: {e}")))?;
        let max_out = resampler.output_frames_max();

        tracing::info!(capture_rate, engine_rate, block, "rate adaptation enabled");

        Ok(Self {
            resampler: Some(resampler),
            input: Vec::new(),
            block,
            output: vec![vec![0.0; max_out]],
        })
    }

    /// Feed captured samples, returning whatever is ready at the engine rate.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input.extend_from_slice(samples);
        let mut out = Vec::new();

        while self.input.len() >= self.block {
            match resampler.process_into_buffer(
                &[&self.input[..self.block]],
                &mut self.output,
                None,
            ) {
                Ok((_, produced)) => out.extend_from_slice(&self.output[0][..produced]),
                Err(e) => tracing::error!(error = %e, "resampler failed on block"),
            }
            self.input.drain(..self.block);
        }

        out
    }

    /// True when no resampling happens.
    #[must_use]
    pub const fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_stereo_frames() {
        let interleaved = [0.5, -0.5, 1.0, 0.0, -1.0, -1.0];
        let mono = downmix(&interleaved, 2);
        assert_eq!(mono, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let samples = [0.1, 0.2, 0.3];
        assert_eq!(downmix(&samples, 1), samples.to_vec());
    }

    #[test]
    fn passthrough_returns_input_unchanged() {
        let mut adapter = RateAdapter::new(24_000, 24_000, 512).unwrap();
        assert!(adapter.is_passthrough());

        let samples = vec![0.25f32; 300];
        assert_eq!(adapter.process(&samples), samples);
    }

    #[test]
    fn downsampling_halves_48k_input() {
        let mut adapter = RateAdapter::new(48_000, 24_000, 960).unwrap();
        assert!(!adapter.is_passthrough());

        let out = adapter.process(&vec![0.0f32; 960]);
        assert!(!out.is_empty());
        // 960 samples at 48 kHz cover 20 ms, about 480 samples at 24 kHz.
        assert!(out.len().abs_diff(480) <= 16, "got {}", out.len());
    }

    #[test]
    fn partial_block_is_held_back() {
        let mut adapter = RateAdapter::new(48_000, 24_000, 960).unwrap();
        assert!(adapter.process(&vec![0.0f32; 500]).is_empty());
        // Second push crosses the block size and releases output.
        assert!(!adapter.process(&vec![0.0f32; 500]).is_empty());
    }

    #[test]
    fn wav_render_carries_header_and_samples() {
        let wav = pcm_to_wav(&[0, 1000, -1000, 32767], 24_000).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte PCM header plus two bytes per sample.
        assert_eq!(wav.len(), 44 + 4 * 2);
    }
}
