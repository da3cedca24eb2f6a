use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Reopen the last stream url when the daemon starts.
    #[serde(default)]
    pub resume_on_start: bool,
}

/// Which stream backend the daemon drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioBackend {
    /// Stream manager over one mpv process per sound.
    #[default]
    Engine,
    /// A single mpv acting as a complete media player.
    Player,
}

/// Stream buffering, retry and shutdown tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub backend: AudioBackend,
    /// Network buffer length in milliseconds.
    #[serde(default = "default_stream_buffer_ms")]
    pub stream_buffer_ms: u32,
    /// Decoder PCM buffer length in milliseconds.
    #[serde(default = "default_decode_buffer_ms")]
    pub decode_buffer_ms: u32,
    /// Bitrate assumed when turning buffer lengths into byte sizes.
    #[serde(default = "default_bitrate_kbps")]
    pub assumed_bitrate_kbps: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_drain_attempts")]
    pub drain_attempts: u32,
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Interval between stream manager updates.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_gain")]
    pub default_gain: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MpvConfig {
    /// Explicit mpv binary.  Searched beside the executable and on PATH when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,
    /// Extra command line arguments passed to every mpv instance.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            resume_on_start: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: AudioBackend::default(),
            stream_buffer_ms: default_stream_buffer_ms(),
            decode_buffer_ms: default_decode_buffer_ms(),
            assumed_bitrate_kbps: default_bitrate_kbps(),
            max_retries: default_max_retries(),
            drain_attempts: default_drain_attempts(),
            drain_interval_ms: default_drain_interval_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            default_gain: default_gain(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_stream_buffer_ms() -> u32 {
    10_000
}

fn default_decode_buffer_ms() -> u32 {
    400
}

fn default_bitrate_kbps() -> u32 {
    128
}

fn default_max_retries() -> u32 {
    2
}

fn default_drain_attempts() -> u32 {
    20
}

fn default_drain_interval_ms() -> u64 {
    10
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_gain() -> f32 {
    0.5
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon: DaemonConfig::default(),
            audio: AudioConfig::default(),
            mpv: MpvConfig::default(),
            control: ControlConfig::default(),
        }
    }
}
