//! Transcription channels: the seam between captured audio and the turn
//! orchestrator.
//!
//! A channel owns its transport (socket, on-device engine session loop) and
//! reports everything through a single event stream. The orchestrator never
//! learns which backend is behind the seam; backend-specific recovery that
//! needs no orchestrator policy (silent session restarts) happens inside the
//! channel, while errors that need policy are classified and surfaced.

pub mod cloud;
pub mod on_device;

use crate::audio::AudioChunk;
use crate::error::Result;
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex};

/// How the orchestrator should react to a channel error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected noise (no speech matched, speech timeout). The channel has
    /// already recovered; nothing to do.
    Benign,
    /// The channel stopped but a restart is likely to succeed. The
    /// orchestrator restarts it after a short backoff.
    Transient,
    /// Restarting will not help (unsupported language, bad credentials).
    /// The orchestrator suspends transcription and tells the user.
    Fatal,
}

/// Everything a channel can tell the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The backend accepted the session and is ready for audio.
    Opened,
    /// The user started speaking a new turn.
    TurnBegin,
    /// Hypothesis text for the current turn. Supersedes earlier partials.
    Partial(String),
    /// Confirmed text for a finished turn.
    Final(String),
    /// The backend considers the current turn closed. Follows the turn's
    /// last `Final`; no more partials supersede it.
    TurnEnd,
    /// The channel hit a problem. `Benign` errors are informational;
    /// `Transient` and `Fatal` mean the channel has stopped.
    Error { class: ErrorClass, message: String },
    /// The channel shut down cleanly (after `stop`, or server termination).
    Closed,
}

/// Per-session channel settings, derived from [`crate::config::Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub endpoint: String,
    pub api_key: String,
    /// Session language for backends that pin one; ignored by backends set
    /// to detect the language themselves.
    pub language: String,
    /// Recognition model requested from cloud backends.
    pub speech_model: String,
    /// Ask cloud backends to follow the speaker across languages.
    pub language_detection: bool,
    pub sample_rate: u32,
    /// Forwarded to backends with native endpointing so their idea of
    /// end-of-utterance roughly matches ours.
    pub silence_threshold_ms: u32,
}

impl ChannelSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            endpoint: config.channel.endpoint.clone(),
            api_key: config.channel.api_key.clone(),
            language: config.translation.source_language.clone(),
            speech_model: config.channel.speech_model.clone(),
            language_detection: config.channel.language_detection,
            sample_rate: config.audio.sample_rate,
            silence_threshold_ms: config.orchestrator.silence_threshold_ms,
        }
    }
}

/// A live transcription backend.
///
/// Implementations must be cheap to stop and restart: the orchestrator tears
/// the channel down on pause and on threshold changes.
pub trait TranscriptionChannel: Send {
    /// Open the channel. Events flow into `events` until `stop` or a
    /// terminal error. Must not block on the network; connection failures
    /// are reported as events.
    fn start(&mut self, settings: &ChannelSettings, events: Sender<ChannelEvent>) -> Result<()>;

    /// Feed captured audio. Dropped silently when the channel is not open.
    fn send_audio(&mut self, chunk: AudioChunk) -> Result<()>;

    /// Ask the backend to close the current utterance now instead of waiting
    /// for its own endpointing. Best effort; backends without the concept
    /// ignore it.
    fn force_endpoint(&mut self) -> Result<()>;

    /// Tear the channel down. Idempotent. After this returns no further
    /// events are delivered.
    fn stop(&mut self) -> Result<()>;
}

/// Scriptable channel for orchestrator tests.
///
/// Tests hold a [`MockChannelHandle`] to inject events and inspect what the
/// orchestrator sent.
pub struct MockChannel {
    handle: MockChannelHandle,
}

#[derive(Clone)]
pub struct MockChannelHandle {
    inner: Arc<Mutex<MockChannelState>>,
}

#[derive(Default)]
struct MockChannelState {
    events: Option<Sender<ChannelEvent>>,
    start_count: u32,
    stop_count: u32,
    force_endpoint_count: u32,
    audio_chunks: Vec<AudioChunk>,
    last_settings: Option<ChannelSettings>,
    fail_start: bool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            handle: MockChannelHandle {
                inner: Arc::new(Mutex::new(MockChannelState::default())),
            },
        }
    }

    pub fn handle(&self) -> MockChannelHandle {
        self.handle.clone()
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannelHandle {
    /// Push an event into the orchestrator, as if the backend produced it.
    /// Panics if the channel was never started (test bug).
    pub fn emit(&self, event: ChannelEvent) {
        let sender = {
            let state = self.inner.lock().unwrap();
            state.events.clone()
        };
        sender
            .expect("MockChannel not started")
            .send(event)
            .expect("orchestrator dropped its event receiver");
    }

    pub fn start_count(&self) -> u32 {
        self.inner.lock().unwrap().start_count
    }

    pub fn stop_count(&self) -> u32 {
        self.inner.lock().unwrap().stop_count
    }

    pub fn force_endpoint_count(&self) -> u32 {
        self.inner.lock().unwrap().force_endpoint_count
    }

    pub fn audio_chunk_count(&self) -> usize {
        self.inner.lock().unwrap().audio_chunks.len()
    }

    pub fn last_settings(&self) -> Option<ChannelSettings> {
        self.inner.lock().unwrap().last_settings.clone()
    }

    pub fn fail_next_start(&self) {
        self.inner.lock().unwrap().fail_start = true;
    }
}

impl TranscriptionChannel for MockChannel {
    fn start(&mut self, settings: &ChannelSettings, events: Sender<ChannelEvent>) -> Result<()> {
        let mut state = self.handle.inner.lock().unwrap();
        if state.fail_start {
            state.fail_start = false;
            return Err(crate::error::VoxflowError::Channel {
                message: "mock start failure".to_string(),
            });
        }
        state.start_count += 1;
        state.last_settings = Some(settings.clone());
        let _ = events.send(ChannelEvent::Opened);
        state.events = Some(events);
        Ok(())
    }

    fn send_audio(&mut self, chunk: AudioChunk) -> Result<()> {
        self.handle.inner.lock().unwrap().audio_chunks.push(chunk);
        Ok(())
    }

    fn force_endpoint(&mut self) -> Result<()> {
        self.handle.inner.lock().unwrap().force_endpoint_count += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.handle.inner.lock().unwrap();
        state.stop_count += 1;
        if let Some(events) = state.events.take() {
            let _ = events.send(ChannelEvent::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn settings() -> ChannelSettings {
        ChannelSettings {
            endpoint: "wss://example.test/ws".to_string(),
            api_key: "key".to_string(),
            language: "en".to_string(),
            speech_model: "universal-streaming-multilingual".to_string(),
            language_detection: true,
            sample_rate: 16000,
            silence_threshold_ms: 500,
        }
    }

    #[test]
    fn mock_channel_reports_open_and_close() {
        let mut channel = MockChannel::new();
        let handle = channel.handle();
        let (tx, rx) = unbounded();

        channel.start(&settings(), tx).unwrap();
        assert_eq!(rx.recv().unwrap(), ChannelEvent::Opened);
        assert_eq!(handle.start_count(), 1);

        handle.emit(ChannelEvent::Partial("hel".to_string()));
        assert_eq!(rx.recv().unwrap(), ChannelEvent::Partial("hel".to_string()));

        channel.stop().unwrap();
        assert_eq!(rx.recv().unwrap(), ChannelEvent::Closed);
        assert_eq!(handle.stop_count(), 1);
    }

    #[test]
    fn mock_channel_records_audio_and_endpoints() {
        let mut channel = MockChannel::new();
        let handle = channel.handle();
        let (tx, _rx) = unbounded();
        channel.start(&settings(), tx).unwrap();

        channel
            .send_audio(AudioChunk::from_samples(&[0i16; 160]))
            .unwrap();
        channel.force_endpoint().unwrap();

        assert_eq!(handle.audio_chunk_count(), 1);
        assert_eq!(handle.force_endpoint_count(), 1);
        assert_eq!(handle.last_settings().unwrap().language, "en");
    }

    #[test]
    fn mock_channel_start_failure() {
        let mut channel = MockChannel::new();
        channel.handle().fail_next_start();
        let (tx, _rx) = unbounded();
        assert!(channel.start(&settings(), tx).is_err());
    }

    #[test]
    fn settings_from_config() {
        let config = crate::config::Config::default();
        let settings = ChannelSettings::from_config(&config);
        assert_eq!(settings.sample_rate, 16000);
        assert_eq!(settings.language, "en");
        assert_eq!(settings.speech_model, "universal-streaming-multilingual");
        assert!(settings.language_detection);
        assert_eq!(settings.silence_threshold_ms, 500);
    }
}
