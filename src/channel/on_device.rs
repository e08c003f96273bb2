//! On-device transcription channel.
//!
//! On-device engines are session oriented: one listening session covers one
//! utterance, then the session ends and must be started again. This channel
//! hides that shape behind the continuous [`TranscriptionChannel`] seam by
//! running a restart loop on its own thread. Expected session endings (no
//! speech matched, speech timeout) restart silently; anything else is
//! classified and surfaced so the orchestrator can apply its restart policy.

use crate::audio::AudioChunk;
use crate::channel::{ChannelEvent, ChannelSettings, ErrorClass, TranscriptionChannel};
use crate::error::Result;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Why a recognizer session ended abnormally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognizerErrorKind {
    /// Audio was heard but nothing recognizable was said.
    NoMatch,
    /// No speech arrived before the engine's own timeout.
    SpeechTimeout,
    /// The engine is still tearing down a previous session.
    Busy,
    /// Client-side engine error.
    Client,
    /// Engine's network-backed path failed.
    Network,
    /// Audio capture failed inside the engine.
    Audio,
    /// Remote recognition service error.
    Server,
    /// The requested language has no model on this device.
    LanguageUnavailable,
    /// Missing audio permissions.
    PermissionDenied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerError {
    pub kind: RecognizerErrorKind,
    pub message: String,
}

impl RecognizerError {
    pub fn new(kind: RecognizerErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// How the pipeline reacts to this error.
    pub fn class(&self) -> ErrorClass {
        use RecognizerErrorKind::*;
        match self.kind {
            NoMatch | SpeechTimeout => ErrorClass::Benign,
            Busy | Client | Network | Audio | Server => ErrorClass::Transient,
            LanguageUnavailable | PermissionDenied => ErrorClass::Fatal,
        }
    }
}

/// What a session reports while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The engine detected the start of speech.
    SpeechStart,
    /// Hypothesis for the in-progress utterance.
    Partial(String),
    /// Recognized text for the finished utterance.
    Final(String),
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The utterance completed (with or without a final).
    Finished,
    Error(RecognizerError),
}

/// Cooperative flags a running session must observe.
#[derive(Debug, Default)]
pub struct SessionControl {
    stop: AtomicBool,
    endpoint: AtomicBool,
}

impl SessionControl {
    /// The channel is shutting down; return as soon as possible.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// The orchestrator wants the current utterance closed now.
    pub fn endpoint_requested(&self) -> bool {
        self.endpoint.load(Ordering::Relaxed)
    }
}

/// A session-per-utterance speech engine.
///
/// `run_session` blocks for the length of one utterance, reporting progress
/// through `emit` and checking `control` often enough that stop and
/// force-endpoint requests take effect promptly.
pub trait Recognizer: Send {
    fn run_session(
        &mut self,
        language: &str,
        control: &SessionControl,
        emit: &mut dyn FnMut(SessionEvent),
    ) -> SessionEnd;
}

pub struct OnDeviceChannel {
    recognizer: Option<Box<dyn Recognizer>>,
    control: Option<Arc<SessionControl>>,
    handle: Option<thread::JoinHandle<Box<dyn Recognizer>>>,
}

impl OnDeviceChannel {
    pub fn new(recognizer: Box<dyn Recognizer>) -> Self {
        Self {
            recognizer: Some(recognizer),
            control: None,
            handle: None,
        }
    }
}

impl TranscriptionChannel for OnDeviceChannel {
    fn start(&mut self, settings: &ChannelSettings, events: Sender<ChannelEvent>) -> Result<()> {
        if self.handle.is_some() {
            self.stop()?;
        }

        let mut recognizer = match self.recognizer.take() {
            Some(r) => r,
            None => {
                return Err(crate::error::VoxflowError::Channel {
                    message: "recognizer lost to a previous panic".to_string(),
                });
            }
        };
        let control = Arc::new(SessionControl::default());
        let thread_control = Arc::clone(&control);
        let language = settings.language.clone();

        let handle = thread::Builder::new()
            .name("on-device-channel".to_string())
            .spawn(move || {
                let _ = events.send(ChannelEvent::Opened);

                while !thread_control.stop_requested() {
                    let produced = std::cell::Cell::new(false);
                    let mut emit = |event: SessionEvent| {
                        produced.set(true);
                        let mapped = match event {
                            SessionEvent::SpeechStart => ChannelEvent::TurnBegin,
                            SessionEvent::Partial(text) => ChannelEvent::Partial(text),
                            SessionEvent::Final(text) => ChannelEvent::Final(text),
                        };
                        let _ = events.send(mapped);
                    };

                    let end = recognizer.run_session(&language, &thread_control, &mut emit);
                    thread_control.endpoint.store(false, Ordering::Relaxed);

                    match end {
                        SessionEnd::Finished => {
                            // One session is one utterance; a session that
                            // heard something closes its turn on the way out.
                            if produced.get() {
                                let _ = events.send(ChannelEvent::TurnEnd);
                            }
                        }
                        SessionEnd::Error(err) => match err.class() {
                            // Silence between utterances is normal; start over.
                            ErrorClass::Benign => {}
                            class => {
                                let _ = events.send(ChannelEvent::Error {
                                    class,
                                    message: err.message,
                                });
                                let _ = events.send(ChannelEvent::Closed);
                                return recognizer;
                            }
                        },
                    }
                }

                let _ = events.send(ChannelEvent::Closed);
                recognizer
            })?;

        self.control = Some(control);
        self.handle = Some(handle);
        Ok(())
    }

    fn send_audio(&mut self, _chunk: AudioChunk) -> Result<()> {
        // The on-device engine captures its own audio.
        Ok(())
    }

    fn force_endpoint(&mut self) -> Result<()> {
        if let Some(control) = &self.control {
            control.endpoint.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(control) = self.control.take() {
            control.stop.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.handle.take() {
            // The recognizer comes back so the channel can be started again.
            if let Ok(recognizer) = handle.join() {
                self.recognizer = Some(recognizer);
            }
        }
        Ok(())
    }
}

impl Drop for OnDeviceChannel {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Scripted recognizer for tests. Each entry is one session: the events it
/// emits and how it ends. Once the script is exhausted, sessions idle until
/// the channel is stopped.
pub struct MockRecognizer {
    sessions: Vec<(Vec<SessionEvent>, SessionEnd)>,
    next: usize,
    languages_seen: Arc<std::sync::Mutex<Vec<String>>>,
}

impl MockRecognizer {
    pub fn new(sessions: Vec<(Vec<SessionEvent>, SessionEnd)>) -> Self {
        Self {
            sessions,
            next: 0,
            languages_seen: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn languages_seen(&self) -> Arc<std::sync::Mutex<Vec<String>>> {
        Arc::clone(&self.languages_seen)
    }
}

impl Recognizer for MockRecognizer {
    fn run_session(
        &mut self,
        language: &str,
        control: &SessionControl,
        emit: &mut dyn FnMut(SessionEvent),
    ) -> SessionEnd {
        self.languages_seen
            .lock()
            .unwrap()
            .push(language.to_string());

        if self.next >= self.sessions.len() {
            while !control.stop_requested() && !control.endpoint_requested() {
                thread::sleep(std::time::Duration::from_millis(2));
            }
            return SessionEnd::Finished;
        }

        let (events, end) = self.sessions[self.next].clone();
        self.next += 1;
        for event in events {
            if control.stop_requested() {
                return SessionEnd::Finished;
            }
            emit(event);
        }
        end
    }
}
