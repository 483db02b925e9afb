//! Transport-size chunking for the duplex audio channel
//!
//! WebSocket peers in the path enforce a per-frame size cap (commonly on the
//! order of 1 MiB). This module bounds every outgoing payload below a
//! configured ceiling measured on the serialized (base64) form, so the raw
//! byte budget per chunk is the ceiling shrunk by the 4/3 text expansion.
//! Oversized payloads are always split, never dropped or truncated, and
//! split points land on even offsets so a 16-bit sample is never torn.

use crate::audio::AudioFrame;
use crate::{Error, Result};

/// Default serialized-size ceiling (leaves margin under the usual 1 MiB
/// WebSocket frame cap)
pub const DEFAULT_CEILING: usize = 300 * 1024;

/// A wire-safe unit of encoded audio derived from one or more frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Logical stream this chunk belongs to
    pub stream_id: u32,
    /// Raw little-endian PCM16 bytes
    pub payload: Vec<u8>,
}

impl EncodedChunk {
    /// Size of this chunk after base64 serialization.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        encoded_len(self.payload.len())
    }
}

/// Base64 length of `raw` bytes (4 output chars per 3 input bytes, padded).
#[must_use]
pub const fn encoded_len(raw: usize) -> usize {
    raw.div_ceil(3) * 4
}

/// Accumulates audio frames and emits chunks bounded by the transport ceiling.
///
/// Accumulation is bounded by `frames_per_chunk`; small frequent chunks keep
/// end-to-end latency low, so the bound is normally 1. `flush` exists so no
/// audio is held back when input stops mid-window.
#[derive(Debug)]
pub struct TransportChunker {
    ceiling: usize,
    raw_budget: usize,
    frames_per_chunk: usize,
    stream_id: u32,
    pending: Vec<u8>,
    pending_frames: usize,
}

impl TransportChunker {
    /// Create a chunker for the given serialized-size ceiling.
    ///
    /// When `ceiling` is 0, the default ceiling ([`DEFAULT_CEILING`]) is used.
    ///
    /// # Errors
    ///
    /// Returns `Error::Chunk` if the ceiling is too small to carry one
    /// base64-expanded sample, or if `frames_per_chunk` is zero.
    pub fn new(ceiling: usize, frames_per_chunk: usize, stream_id: u32) -> Result<Self> {
        let ceiling = if ceiling == 0 { DEFAULT_CEILING } else { ceiling };
        if frames_per_chunk == 0 {
            return Err(Error::Chunk("frames_per_chunk must be nonzero".to_string()));
        }

        let raw_budget = raw_budget_for(ceiling);
        if raw_budget < 2 {
            return Err(Error::Chunk(format!(
                "ceiling {ceiling} cannot carry a single sample"
            )));
        }

        Ok(Self {
            ceiling,
            raw_budget,
            frames_per_chunk,
            stream_id,
            pending: Vec::new(),
            pending_frames: 0,
        })
    }

    /// Append one frame, returning any chunks that are ready to send.
    pub fn push(&mut self, frame: &AudioFrame) -> Vec<EncodedChunk> {
        self.pending.extend_from_slice(&frame.to_le_bytes());
        self.pending_frames += 1;

        if self.pending_frames >= self.frames_per_chunk {
            self.drain_pending()
        } else {
            Vec::new()
        }
    }

    /// Emit everything held, regardless of the accumulation bound.
    pub fn flush(&mut self) -> Vec<EncodedChunk> {
        self.drain_pending()
    }

    /// Serialized-size ceiling this chunker enforces.
    #[must_use]
    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Raw bytes buffered but not yet emitted.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn drain_pending(&mut self) -> Vec<EncodedChunk> {
        self.pending_frames = 0;
        if self.pending.is_empty() {
            return Vec::new();
        }
        let payload = std::mem::take(&mut self.pending);

        split_payload(&payload, self.raw_budget)
            .into_iter()
            .map(|payload| EncodedChunk {
                stream_id: self.stream_id,
                payload,
            })
            .collect()
    }
}

/// Largest even raw byte count whose base64 form stays strictly below `ceiling`.
const fn raw_budget_for(ceiling: usize) -> usize {
    // Whole 4-char base64 groups that fit under the ceiling, 3 raw bytes each.
    let groups = ceiling.saturating_sub(1) / 4;
    (groups * 3) & !1
}

/// Split `payload` into pieces of at most `max_raw` bytes each.
///
/// Split points are kept on even offsets so PCM16 sample pairs stay intact;
/// an odd `max_raw` is rounded down. Concatenating the pieces reproduces
/// `payload` exactly.
#[must_use]
pub fn split_payload(payload: &[u8], max_raw: usize) -> Vec<Vec<u8>> {
    let max_raw = (max_raw.max(2)) & !1;

    if payload.len() <= max_raw {
        return vec![payload.to_vec()];
    }

    let mut pieces = Vec::with_capacity(payload.len().div_ceil(max_raw));
    let mut start = 0;
    while start < payload.len() {
        let mut end = usize::min(start + max_raw, payload.len());
        // Keep the boundary on a sample edge unless this is the final piece.
        if (end - start) % 2 != 0 && end < payload.len() {
            end -= 1;
        }
        pieces.push(payload[start..end].to_vec());
        start = end;
    }
    pieces
}
