//! Configuration management for the bistro bridge
//!
//! Precedence for every setting is env > TOML file > built-in default. The
//! transport and timing values mirror the wire protocol contract: changing
//! them changes what peers must accept, so they are configuration rather
//! than constants.

pub mod file;

use crate::{Error, Result};

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Audio pipeline configuration
    pub audio: AudioConfig,

    /// Handoff pause policy
    pub handoff: HandoffConfig,

    /// Speech engine connection
    pub engine: EngineConfig,

    /// HTTP/WebSocket server configuration
    pub server: ServerConfig,

    /// Session lifecycle configuration
    pub session: SessionConfig,
}

/// Audio pipeline configuration
///
/// The pipeline performs no resampling: capture input must already match
/// `sample_rate`, and a mismatch is rejected as a configuration error.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Engine sample rate in Hz
    pub sample_rate: u32,

    /// Channel count (the pipeline is mono end to end)
    pub channels: u16,

    /// Capture window size in samples, must be a power of two
    pub chunk_window: usize,

    /// Frames accumulated before the chunker emits a transport chunk
    pub frames_per_chunk: usize,

    /// Upper bound on a serialized transport frame, in bytes
    pub transport_ceiling: usize,

    /// Playback scheduling lookahead in milliseconds
    pub lookahead_ms: u64,
}

/// Handoff pause policy
///
/// Which tool names count as a handoff and how long the masking pause lasts
/// are product decisions, so both live here rather than in code.
#[derive(Debug, Clone)]
pub struct HandoffConfig {
    /// Silence injected while an agent handoff settles, in seconds
    pub silence_secs: f64,

    /// Tool-name substrings that indicate an audible handoff
    pub transfer_markers: Vec<String>,

    /// Tool-name substrings exempt from the pause (silent routing)
    pub routing_markers: Vec<String>,
}

/// Speech engine connection
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Realtime engine WebSocket URL
    pub url: String,

    /// Engine API key (from `OPENAI_API_KEY` env)
    pub api_key: Option<String>,

    /// Engine voice identifier
    pub voice: String,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,

    /// WebSocket heartbeat interval in seconds
    pub heartbeat_secs: u64,
}

/// Session lifecycle configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum concurrent sessions
    pub max_sessions: usize,

    /// Idle timeout before a session is reaped, in seconds
    pub idle_timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
            chunk_window: 1024,
            frames_per_chunk: 1,
            transport_ceiling: 300 * 1024,
            lookahead_ms: 50,
        }
    }
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            silence_secs: 2.0,
            transfer_markers: vec![
                "transfer".to_string(),
                "handoff".to_string(),
                "specialist".to_string(),
            ],
            routing_markers: vec!["main".to_string(), "routing".to_string()],
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview".to_string(),
            api_key: None,
            voice: "alloy".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            heartbeat_secs: 30,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            idle_timeout_secs: 300,
        }
    }
}

impl AudioConfig {
    /// Duration of one capture window in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn window_secs(&self) -> f64 {
        self.chunk_window as f64 / f64::from(self.sample_rate)
    }

    /// Playback lookahead in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }
}

impl Config {
    /// Load configuration with env > TOML > default precedence
    ///
    /// # Errors
    ///
    /// Returns error if the resulting audio parameters are invalid (zero or
    /// non-power-of-two window, non-mono channel count, unusable transport
    /// ceiling).
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();

        let audio_default = AudioConfig::default();
        let audio = AudioConfig {
            sample_rate: env_parse("BISTRO_SAMPLE_RATE")
                .or(fc.audio.sample_rate)
                .unwrap_or(audio_default.sample_rate),
            channels: env_parse("BISTRO_CHANNELS")
                .or(fc.audio.channels)
                .unwrap_or(audio_default.channels),
            chunk_window: env_parse("BISTRO_CHUNK_WINDOW")
                .or(fc.audio.chunk_window)
                .unwrap_or(audio_default.chunk_window),
            frames_per_chunk: env_parse("BISTRO_FRAMES_PER_CHUNK")
                .or(fc.audio.frames_per_chunk)
                .unwrap_or(audio_default.frames_per_chunk),
            transport_ceiling: env_parse("BISTRO_TRANSPORT_CEILING")
                .or(fc.audio.transport_ceiling)
                .unwrap_or(audio_default.transport_ceiling),
            lookahead_ms: env_parse("BISTRO_LOOKAHEAD_MS")
                .or(fc.audio.lookahead_ms)
                .unwrap_or(audio_default.lookahead_ms),
        };

        let handoff_default = HandoffConfig::default();
        let handoff = HandoffConfig {
            silence_secs: env_parse("BISTRO_HANDOFF_SILENCE_SECS")
                .or(fc.handoff.silence_secs)
                .unwrap_or(handoff_default.silence_secs),
            transfer_markers: env_list("BISTRO_TRANSFER_MARKERS")
                .or(fc.handoff.transfer_markers)
                .unwrap_or(handoff_default.transfer_markers),
            routing_markers: env_list("BISTRO_ROUTING_MARKERS")
                .or(fc.handoff.routing_markers)
                .unwrap_or(handoff_default.routing_markers),
        };

        let engine_default = EngineConfig::default();
        let engine = EngineConfig {
            url: std::env::var("BISTRO_ENGINE_URL")
                .ok()
                .or(fc.engine.url)
                .unwrap_or(engine_default.url),
            api_key: std::env::var("OPENAI_API_KEY").ok().or(fc.engine.api_key),
            voice: std::env::var("BISTRO_ENGINE_VOICE")
                .ok()
                .or(fc.engine.voice)
                .unwrap_or(engine_default.voice),
        };

        let server_default = ServerConfig::default();
        let server = ServerConfig {
            host: std::env::var("BISTRO_HOST")
                .ok()
                .or(fc.server.host)
                .unwrap_or(server_default.host),
            port: std::env::var("BISTRO_PORT")
                .or_else(|_| std::env::var("PORT"))
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(server_default.port),
            cors_origins: env_list("BISTRO_CORS_ORIGINS")
                .or(fc.server.cors_origins)
                .unwrap_or(server_default.cors_origins),
            heartbeat_secs: env_parse("BISTRO_HEARTBEAT_SECS")
                .or(fc.server.heartbeat_secs)
                .unwrap_or(server_default.heartbeat_secs),
        };

        let session_default = SessionConfig::default();
        let session = SessionConfig {
            max_sessions: env_parse("BISTRO_MAX_SESSIONS")
                .or(fc.session.max_sessions)
                .unwrap_or(session_default.max_sessions),
            idle_timeout_secs: env_parse("BISTRO_IDLE_TIMEOUT_SECS")
                .or(fc.session.idle_timeout_secs)
                .unwrap_or(session_default.idle_timeout_secs),
        };

        let config = Self {
            audio,
            handoff,
            engine,
            server,
            session,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the audio pipeline relies on
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be nonzero".to_string()));
        }
        if self.audio.channels != 1 {
            return Err(Error::Config(format!(
                "pipeline is mono only, got {} channels",
                self.audio.channels
            )));
        }
        if !self.audio.chunk_window.is_power_of_two() {
            return Err(Error::Config(format!(
                "chunk_window must be a power of two, got {}",
                self.audio.chunk_window
            )));
        }
        if self.audio.frames_per_chunk == 0 {
            return Err(Error::Config("frames_per_chunk must be nonzero".to_string()));
        }
        // Smallest useful ceiling: one base64-expanded PCM16 sample.
        if self.audio.transport_ceiling < 8 {
            return Err(Error::Config(format!(
                "transport_ceiling {} cannot carry a single sample",
                self.audio.transport_ceiling
            )));
        }
        if self.handoff.silence_secs < 0.0 {
            return Err(Error::Config("handoff silence_secs must be >= 0".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            handoff: HandoffConfig::default(),
            engine: EngineConfig::default(),
            server: ServerConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Read and parse an env var, ignoring unset or malformed values
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Read a comma-separated env var into a list, dropping empty entries
fn env_list(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|s| {
        s.split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    })
}
