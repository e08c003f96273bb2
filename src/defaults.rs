//! Default configuration constants for voxflow.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for streaming speech recognition and provides a good
/// balance between quality and bandwidth for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Duration of one capture chunk in milliseconds.
///
/// Streaming recognition backends want chunks between 100ms and 2s; ~100ms
/// keeps end-to-end latency low without flooding the socket.
pub const CHUNK_MS: u32 = 100;

/// Default client-side silence threshold in milliseconds.
///
/// How long the orchestrator waits after the last transcript event before
/// deciding the utterance is over and flushing it to translation.
pub const SILENCE_THRESHOLD_MS: u32 = 500;

/// Minimum accepted silence threshold (milliseconds).
pub const MIN_SILENCE_THRESHOLD_MS: u32 = 500;

/// Maximum accepted silence threshold (milliseconds).
pub const MAX_SILENCE_THRESHOLD_MS: u32 = 3000;

/// Hard ceiling on a single segment, measured from its first fragment.
///
/// If the silence timer never gets a chance to fire (continuous speech), the
/// segment is cut here so translation latency stays bounded.
pub const MAX_SEGMENT_MS: u32 = 6000;

/// Delay before recreating a transcription channel after a transient error.
pub const RESTART_BACKOFF: Duration = Duration::from_millis(400);

/// Default source language code (what the user speaks).
pub const SOURCE_LANGUAGE: &str = "en";

/// Default target language code (what comes out of translation).
pub const TARGET_LANGUAGE: &str = "it";

/// Maximum preparation attempts for a translation resource.
pub const TRANSLATION_PREPARE_RETRIES: u32 = 3;

/// Base backoff between translation preparation attempts; multiplied by the
/// attempt number.
pub const TRANSLATION_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Watchdog for a single translation preparation attempt.
pub const TRANSLATION_PREPARE_WATCHDOG: Duration = Duration::from_secs(45);

/// Default cloud streaming endpoint.
pub const CLOUD_ENDPOINT: &str = "wss://streaming.assemblyai.com/v3/ws";

/// Default cloud recognition model. The multilingual streaming model lets the
/// service follow the speaker across languages within one session.
pub const CLOUD_SPEECH_MODEL: &str = "universal-streaming-multilingual";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_bounds_contain_default() {
        assert!(SILENCE_THRESHOLD_MS >= MIN_SILENCE_THRESHOLD_MS);
        assert!(SILENCE_THRESHOLD_MS <= MAX_SILENCE_THRESHOLD_MS);
    }

    #[test]
    fn ceiling_exceeds_max_threshold() {
        // The ceiling must be a backstop, never the common case.
        assert!(MAX_SEGMENT_MS > MAX_SILENCE_THRESHOLD_MS);
    }
}
