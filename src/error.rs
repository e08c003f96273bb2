//! Error types for voxflow.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxflowError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    AudioFormatMismatch { expected: String, actual: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Transcription channel errors
    #[error("Transcription channel failed: {message}")]
    Channel { message: String },

    #[error("Transcription channel closed")]
    ChannelClosed,

    #[error("Language not supported by backend: {language}")]
    LanguageUnsupported { language: String },

    // Translation errors
    #[error("Translation failed: {message}")]
    Translation { message: String },

    #[error("Translation resource not ready for {language}")]
    TranslationNotReady { language: String },

    // Synthesis errors
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    // Transcript errors
    #[error("Transcript write failed: {message}")]
    Transcript { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_audio_device_not_found_display() {
        let error = VoxflowError::AudioDeviceNotFound {
            device: "default".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: default");
    }

    #[test]
    fn test_audio_format_mismatch_display() {
        let error = VoxflowError::AudioFormatMismatch {
            expected: "16kHz mono".to_string(),
            actual: "44.1kHz stereo".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio format mismatch: expected 16kHz mono, got 44.1kHz stereo"
        );
    }

    #[test]
    fn test_channel_display() {
        let error = VoxflowError::Channel {
            message: "socket reset".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Transcription channel failed: socket reset"
        );
    }

    #[test]
    fn test_language_unsupported_display() {
        let error = VoxflowError::LanguageUnsupported {
            language: "xx".to_string(),
        };
        assert_eq!(error.to_string(), "Language not supported by backend: xx");
    }

    #[test]
    fn test_translation_not_ready_display() {
        let error = VoxflowError::TranslationNotReady {
            language: "pt".to_string(),
        };
        assert_eq!(error.to_string(), "Translation resource not ready for pt");
    }

    #[test]
    fn test_transcript_display() {
        let error = VoxflowError::Transcript {
            message: "disk full".to_string(),
        };
        assert_eq!(error.to_string(), "Transcript write failed: disk full");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VoxflowError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: VoxflowError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VoxflowError>();
        assert_sync::<VoxflowError>();
    }
}
