//! TOML configuration file loading
//!
//! Supports `~/.config/bistro/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BistroConfigFile {
    /// Audio pipeline configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Handoff pause policy
    #[serde(default)]
    pub handoff: HandoffFileConfig,

    /// Speech engine connection
    #[serde(default)]
    pub engine: EngineFileConfig,

    /// HTTP/WebSocket server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Audio pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Engine sample rate in Hz (e.g. 24000)
    pub sample_rate: Option<u32>,

    /// Channel count (mono pipeline, must be 1)
    pub channels: Option<u16>,

    /// Capture window size in samples (power of two)
    pub chunk_window: Option<usize>,

    /// Frames accumulated per transport chunk
    pub frames_per_chunk: Option<usize>,

    /// Serialized transport frame ceiling in bytes
    pub transport_ceiling: Option<usize>,

    /// Playback scheduling lookahead in milliseconds
    pub lookahead_ms: Option<u64>,
}

/// Handoff pause policy
#[derive(Debug, Default, Deserialize)]
pub struct HandoffFileConfig {
    /// Silence injected while an agent handoff settles, in seconds
    pub silence_secs: Option<f64>,

    /// Tool-name substrings that indicate an audible handoff
    pub transfer_markers: Option<Vec<String>>,

    /// Tool-name substrings exempt from the pause (silent routing)
    pub routing_markers: Option<Vec<String>>,
}

/// Speech engine connection
#[derive(Debug, Default, Deserialize)]
pub struct EngineFileConfig {
    /// Realtime engine WebSocket URL
    pub url: Option<String>,

    /// Engine API key
    pub api_key: Option<String>,

    /// Engine voice identifier (e.g. "alloy")
    pub voice: Option<String>,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub host: Option<String>,

    /// Server port
    pub port: Option<u16>,

    /// Allowed CORS origins
    pub cors_origins: Option<Vec<String>>,

    /// WebSocket heartbeat interval in seconds
    pub heartbeat_secs: Option<u64>,
}

/// Session lifecycle configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Maximum concurrent sessions
    pub max_sessions: Option<usize>,

    /// Idle timeout before a session is reaped, in seconds
    pub idle_timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `BistroConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> BistroConfigFile {
    let Some(path) = config_file_path() else {
        return BistroConfigFile::default();
    };

    if !path.exists() {
        return BistroConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                BistroConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BistroConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/bistro/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("bistro").join("config.toml"))
}
