//! Audio pipeline primitives
//!
//! Fixed-window capture encoding, PCM16 conversion, and transport-size
//! chunking. Everything here is pure and synchronous; device I/O lives in
//! `client` and `playback::sink`.

mod chunk;
mod encode;
mod frame;

pub use chunk::{DEFAULT_CEILING, EncodedChunk, TransportChunker, encoded_len, split_payload};
pub use encode::{CaptureEncoder, decode_pcm16, encode_pcm16, silence_bytes};
pub use frame::AudioFrame;
