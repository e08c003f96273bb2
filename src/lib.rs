//! voxflow - Live speech translation for the terminal
//!
//! Captures speech, streams it to a transcription backend, decides where
//! each spoken turn ends, translates the finished segment, speaks the
//! translation aloud, and keeps a session transcript.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod app;
pub mod audio;
pub mod channel;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod synth;
pub mod transcript;
pub mod translate;

// Core seams (capture → transcribe → orchestrate → translate → speak)
pub use audio::recorder::AudioSource;
pub use channel::{ChannelEvent, ChannelSettings, ErrorClass, TranscriptionChannel};
pub use synth::SpeechSynthesizer;
pub use translate::{Readiness, Translator};

// Orchestration
pub use orchestrator::{Command, Notice, OrchestratorDeps, OrchestratorHandle, TurnSettings};

// Error handling
pub use error::{Result, VoxflowError};

// Config
pub use config::{Backend, Config};

// Transcript persistence
pub use transcript::TranscriptWriter;

/// Build version string with optional git commit hash.
pub fn version_string() -> String {
    match option_env!("GIT_HASH") {
        Some(hash) => format!("{} ({})", env!("CARGO_PKG_VERSION"), hash),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_includes_package_version() {
        assert!(version_string().starts_with(env!("CARGO_PKG_VERSION")));
    }
}
