//! Audio output behind the playback scheduler

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::playback::ScheduledUnit;
use crate::{Error, Result};

/// Device boundary of the playback pipeline
///
/// The scheduler decides when units play; implementations decide how. The
/// device timeline starts at zero when the sink starts and only ever moves
/// forward.
pub trait AudioSink {
    /// Current device time in seconds.
    fn now(&self) -> f64;

    /// Queue `samples` to begin exactly at `unit.start` on the device timeline.
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the unit.
    fn begin(&mut self, unit: &ScheduledUnit, samples: &[i16]) -> Result<()>;

    /// Drop everything queued, in one call.
    fn halt_all(&mut self);
}

/// One scheduled run of samples on the device timeline
struct Segment {
    start_frame: u64,
    samples: Vec<f32>,
}

/// State shared with the output stream callback
#[derive(Default)]
struct SinkShared {
    cursor_frames: u64,
    segments: Vec<Segment>,
}

impl SinkShared {
    /// Fill one output buffer from the queued segments.
    ///
    /// Frames with no covering segment are silence, which is what a gap in
    /// the timeline should sound like.
    #[allow(clippy::cast_possible_truncation)]
    fn fill(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels) {
            let idx = self.cursor_frames;
            let mut value = 0.0f32;
            for segment in &self.segments {
                if idx >= segment.start_frame {
                    let offset = idx - segment.start_frame;
                    if offset < segment.samples.len() as u64 {
                        value += segment.samples[offset as usize];
                    }
                }
            }
            for out in frame.iter_mut() {
                *out = value;
            }
            self.cursor_frames += 1;
        }

        let cursor = self.cursor_frames;
        self.segments
            .retain(|s| s.start_frame + s.samples.len() as u64 > cursor);
    }
}

/// Plays scheduled units on the default output device
pub struct DeviceSink {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
    shared: Arc<Mutex<SinkShared>>,
    stream: Option<Stream>,
}

impl DeviceSink {
    /// Open the default output device at `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports the rate in mono or stereo.
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "playback sink initialized"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            shared: Arc::new(Mutex::new(SinkShared::default())),
            stream: None,
        })
    }

    /// Start the output stream if it isn't running yet.
    fn ensure_stream(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let config = self.config.clone();
        let channels = config.channels as usize;
        let shared = Arc::clone(&self.shared);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut state) = shared.lock() {
                        state.fill(data, channels);
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("playback stream started");
        Ok(())
    }
}

impl AudioSink for DeviceSink {
    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        self.shared
            .lock()
            .map(|state| state.cursor_frames as f64 / f64::from(self.sample_rate))
            .unwrap_or_default()
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn begin(&mut self, unit: &ScheduledUnit, samples: &[i16]) -> Result<()> {
        self.ensure_stream()?;

        let start_frame = (unit.start * f64::from(self.sample_rate)).round() as u64;
        let samples = crate::audio::decode_pcm16(samples);

        if let Ok(mut state) = self.shared.lock() {
            state.segments.push(Segment {
                start_frame,
                samples,
            });
        }
        Ok(())
    }

    fn halt_all(&mut self) {
        if let Ok(mut state) = self.shared.lock() {
            let dropped = state.segments.len();
            state.segments.clear();
            if dropped > 0 {
                tracing::debug!(segments = dropped, "sink halted");
            }
        }
    }
}
