//! Shared test utilities

use bistro_bridge::Config;

/// Bridge config as a deployed instance would load it, engine key included
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.engine.api_key = Some("sk-test-key".to_string());
    config
}

/// PCM16 samples as the little-endian bytes peers exchange on the wire
#[must_use]
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
