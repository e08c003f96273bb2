use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub channel: ChannelConfig,
    pub translation: TranslationConfig,
    pub orchestrator: OrchestratorConfig,
    pub transcript: TranscriptConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
}

/// Transcription backend selection and credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    pub backend: Backend,
    pub endpoint: String,
    pub api_key: String,
    /// Recognition model requested from the cloud backend.
    pub speech_model: String,
    /// Let the cloud backend detect the spoken language instead of pinning
    /// it to the configured source language.
    pub language_detection: bool,
}

/// Which transcription backend feeds the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Persistent duplex socket to a streaming recognition service.
    Cloud,
    /// Session-oriented on-device recognizer.
    OnDevice,
}

/// Translation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub source_language: String,
    pub target_language: String,
}

/// Turn orchestrator tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Silence threshold in milliseconds before a segment is flushed.
    pub silence_threshold_ms: u32,
}

/// Transcript persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Directory for session transcripts. Defaults to the platform documents
    /// directory (or the current directory without one).
    pub directory: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Cloud,
            endpoint: defaults::CLOUD_ENDPOINT.to_string(),
            api_key: String::new(),
            speech_model: defaults::CLOUD_SPEECH_MODEL.to_string(),
            language_detection: true,
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Cloud
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_language: defaults::SOURCE_LANGUAGE.to_string(),
            target_language: defaults::TARGET_LANGUAGE.to_string(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: defaults::SILENCE_THRESHOLD_MS,
        }
    }
}

/// Clamp a silence threshold to the supported range.
pub fn clamp_silence_threshold(ms: u32) -> u32 {
    ms.clamp(
        defaults::MIN_SILENCE_THRESHOLD_MS,
        defaults::MAX_SILENCE_THRESHOLD_MS,
    )
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXFLOW_API_KEY → channel.api_key
    /// - VOXFLOW_TARGET_LANGUAGE → translation.target_language
    /// - VOXFLOW_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("VOXFLOW_API_KEY")
            && !key.is_empty()
        {
            self.channel.api_key = key;
        }

        if let Ok(lang) = std::env::var("VOXFLOW_TARGET_LANGUAGE")
            && !lang.is_empty()
        {
            self.translation.target_language = lang;
        }

        if let Ok(device) = std::env::var("VOXFLOW_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxflow/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxflow")
            .join("config.toml")
    }
}
