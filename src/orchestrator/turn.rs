//! The turn orchestrator actor.
//!
//! Everything that can mutate segment or timer state (transcript events,
//! timer fires, user commands, translation completions, captured audio)
//! funnels into one thread running a select loop, so no mutation ever races
//! another. Delayed actions (channel restarts, translation completions) are
//! tagged with the session epoch at schedule time and discarded if a newer
//! stop or reconfigure advanced the epoch in the meantime.

use crate::audio::{AudioChunk, AudioSource, CapturePump, PumpConfig};
use crate::channel::{ChannelEvent, ChannelSettings, ErrorClass, TranscriptionChannel};
use crate::config::{clamp_silence_threshold, Config};
use crate::defaults;
use crate::error::{Result, VoxflowError};
use crate::orchestrator::segment::SegmentAssembler;
use crate::orchestrator::timer::TimerSlot;
use crate::synth::{SpeechSynthesizer, SynthesisStage};
use crate::translate::{TranslationOutcome, TranslationStage, Translator};
use crate::transcript::TranscriptWriter;
use crossbeam_channel::{select, unbounded, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Bounded restarts: give up on the channel after this many failed
/// consecutive attempts.
const MAX_CHANNEL_RESTARTS: u32 = 5;

/// User-originated commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Stop,
    /// Cut the current turn now instead of waiting for silence.
    ForceEndTurn,
    /// New inactivity threshold in milliseconds (clamped to the supported
    /// range). Restarts listening; unflushed text is discarded.
    SetSilenceThreshold(u32),
    /// New translation target. Restarts listening and re-prepares the
    /// translator.
    SetTargetLanguage(String),
}

/// What the orchestrator tells the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Listening,
    Paused,
    Stopped,
    ChannelOpen,
    Partial(String),
    Final(String),
    SegmentFlushed(String),
    Translated {
        original: String,
        translated: String,
    },
    TranslationReady(String),
    TranslationUnavailable {
        language: String,
        message: String,
    },
    /// Fatal channel error; listening is suspended until reconfiguration.
    TranscriptionSuspended(String),
    Error(String),
}

/// Session-scoped tuning, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub channel: ChannelSettings,
    pub source_language: String,
    pub target_language: String,
    pub silence_threshold_ms: u32,
    pub max_segment_ms: u32,
    pub restart_backoff: Duration,
    pub pump: PumpConfig,
}

impl TurnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel: ChannelSettings::from_config(config),
            source_language: config.translation.source_language.clone(),
            target_language: config.translation.target_language.clone(),
            silence_threshold_ms: clamp_silence_threshold(config.orchestrator.silence_threshold_ms),
            max_segment_ms: defaults::MAX_SEGMENT_MS,
            restart_backoff: defaults::RESTART_BACKOFF,
            pump: PumpConfig {
                sample_rate: config.audio.sample_rate,
                chunk_ms: defaults::CHUNK_MS,
            },
        }
    }
}

/// Everything the orchestrator drives. The factory yields a fresh audio
/// source per listening period, since a stopped capture stream cannot be
/// reused.
pub struct OrchestratorDeps {
    pub channel: Box<dyn TranscriptionChannel>,
    pub source_factory: Box<dyn FnMut() -> Result<Box<dyn AudioSource>> + Send>,
    pub translator: Box<dyn Translator>,
    pub synthesizer: Box<dyn SpeechSynthesizer>,
    pub transcript: Arc<TranscriptWriter>,
}

enum Input {
    Command(Command),
    Translation(TranslationOutcome),
    Audio(AudioChunk),
    AudioFailed(VoxflowError),
}

/// Handle to the running actor thread.
pub struct OrchestratorHandle {
    inputs: Sender<Input>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OrchestratorHandle {
    /// Spawn the actor. Notices are delivered on the actor thread; the
    /// receiver must keep draining them.
    pub fn spawn(
        deps: OrchestratorDeps,
        settings: TurnSettings,
        notices: Sender<Notice>,
    ) -> Result<Self> {
        let (input_tx, input_rx) = unbounded::<Input>();
        let (channel_tx, channel_rx) = unbounded::<ChannelEvent>();

        let translation_tx = input_tx.clone();
        let translation = TranslationStage::spawn(deps.translator, move |outcome| {
            let _ = translation_tx.send(Input::Translation(outcome));
        })?;
        let synthesis = SynthesisStage::spawn(deps.synthesizer)?;

        let actor_inputs = input_tx.clone();
        let handle = thread::Builder::new()
            .name("turn-orchestrator".to_string())
            .spawn(move || {
                let mut actor = Actor {
                    state: State::Idle,
                    epoch: 0,
                    settings,
                    channel: deps.channel,
                    channel_active: false,
                    channel_tx,
                    source_factory: deps.source_factory,
                    pump: None,
                    inputs: actor_inputs,
                    translation,
                    synthesis,
                    transcript: deps.transcript,
                    segment: SegmentAssembler::new(),
                    silence: TimerSlot::disarmed(),
                    ceiling: TimerSlot::disarmed(),
                    restart: TimerSlot::disarmed(),
                    restart_epoch: 0,
                    restart_attempts: 0,
                    notices,
                };
                actor.run(input_rx, channel_rx);
            })?;

        Ok(Self {
            inputs: input_tx,
            handle: Some(handle),
        })
    }

    pub fn send(&self, command: Command) {
        let _ = self.inputs.send(Input::Command(command));
    }

    /// Stop the session and wait for the actor to finish.
    pub fn stop(&mut self) {
        self.send(Command::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OrchestratorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Listening,
    Stopped,
}

struct Actor {
    state: State,
    /// Advances on stop, pause, and controlled restarts. Anything scheduled
    /// under an older epoch is discarded when it lands.
    epoch: u64,
    settings: TurnSettings,
    channel: Box<dyn TranscriptionChannel>,
    channel_active: bool,
    channel_tx: Sender<ChannelEvent>,
    source_factory: Box<dyn FnMut() -> Result<Box<dyn AudioSource>> + Send>,
    pump: Option<CapturePump>,
    inputs: Sender<Input>,
    translation: TranslationStage,
    synthesis: SynthesisStage,
    transcript: Arc<TranscriptWriter>,
    segment: SegmentAssembler,
    silence: TimerSlot,
    ceiling: TimerSlot,
    restart: TimerSlot,
    restart_epoch: u64,
    restart_attempts: u32,
    notices: Sender<Notice>,
}

impl Actor {
    fn run(
        &mut self,
        inputs: crossbeam_channel::Receiver<Input>,
        channel_events: crossbeam_channel::Receiver<ChannelEvent>,
    ) {
        // The translator can start preparing before the first start command.
        self.translation.prepare(
            self.epoch,
            &self.settings.source_language,
            &self.settings.target_language,
        );

        while self.state != State::Stopped {
            let silence_rx = self.silence.receiver().clone();
            let ceiling_rx = self.ceiling.receiver().clone();
            let restart_rx = self.restart.receiver().clone();

            select! {
                recv(inputs) -> msg => match msg {
                    Ok(input) => self.on_input(input),
                    Err(_) => self.shutdown("handle dropped"),
                },
                recv(channel_events) -> msg => {
                    if let Ok(event) = msg {
                        self.on_channel_event(event);
                    }
                },
                recv(silence_rx) -> _ => {
                    self.silence.consume();
                    self.on_silence_elapsed();
                },
                recv(ceiling_rx) -> _ => {
                    self.ceiling.consume();
                    self.on_ceiling_elapsed();
                },
                recv(restart_rx) -> _ => {
                    self.restart.consume();
                    self.on_restart_due();
                },
            }
        }
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }

    fn on_input(&mut self, input: Input) {
        match input {
            Input::Command(command) => self.on_command(command),
            Input::Translation(outcome) => self.on_translation(outcome),
            Input::Audio(chunk) => {
                if self.state == State::Listening && self.channel_active {
                    let _ = self.channel.send_audio(chunk);
                }
            }
            Input::AudioFailed(e) => {
                if self.state == State::Listening {
                    self.notify(Notice::Error(format!("audio capture failed: {}", e)));
                    self.enter_idle(false);
                }
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Start => {
                if self.state == State::Idle {
                    self.enter_listening();
                }
            }
            Command::Pause => {
                if self.state == State::Listening {
                    self.enter_idle(true);
                    self.notify(Notice::Paused);
                }
            }
            Command::Stop => self.shutdown("user stop"),
            Command::ForceEndTurn => {
                if self.state == State::Listening {
                    self.flush_segment();
                    self.silence.disarm();
                    self.ceiling.disarm();
                    let _ = self.channel.force_endpoint();
                }
            }
            Command::SetSilenceThreshold(ms) => {
                let clamped = clamp_silence_threshold(ms);
                self.settings.silence_threshold_ms = clamped;
                self.settings.channel.silence_threshold_ms = clamped;
                if self.state == State::Listening {
                    self.controlled_restart();
                }
            }
            Command::SetTargetLanguage(language) => {
                self.settings.target_language = language;
                if self.state == State::Listening {
                    self.controlled_restart();
                } else {
                    self.epoch += 1;
                }
                self.translation.prepare(
                    self.epoch,
                    &self.settings.source_language,
                    &self.settings.target_language,
                );
            }
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        if self.state != State::Listening {
            return;
        }
        match event {
            ChannelEvent::Opened => {
                self.restart_attempts = 0;
                self.notify(Notice::ChannelOpen);
            }
            ChannelEvent::TurnBegin => {
                // Barge-in: never talk over the user.
                self.synthesis.interrupt();
            }
            ChannelEvent::Partial(text) => {
                self.segment.on_partial(&text);
                self.arm_ceiling_if_needed();
                self.silence
                    .arm(Duration::from_millis(self.settings.silence_threshold_ms as u64));
                self.notify(Notice::Partial(text));
            }
            ChannelEvent::Final(text) => {
                self.segment.on_final(&text);
                self.arm_ceiling_if_needed();
                self.silence
                    .arm(Duration::from_millis(self.settings.silence_threshold_ms as u64));
                self.notify(Notice::Final(text));
            }
            // Informational: segment flushing is driven by our own timers,
            // not by the backend's idea of where a turn ends.
            ChannelEvent::TurnEnd => {}
            ChannelEvent::Error { class, message } => match class {
                ErrorClass::Benign => {}
                ErrorClass::Transient => {
                    self.channel_active = false;
                    self.schedule_restart(message);
                }
                ErrorClass::Fatal => {
                    self.channel_active = false;
                    self.notify(Notice::TranscriptionSuspended(message));
                    self.enter_idle(false);
                }
            },
            ChannelEvent::Closed => {}
        }
    }

    fn arm_ceiling_if_needed(&mut self) {
        if !self.ceiling.is_armed() && self.segment.has_fragment() {
            self.ceiling
                .arm(Duration::from_millis(self.settings.max_segment_ms as u64));
        }
    }

    fn on_silence_elapsed(&mut self) {
        if self.state != State::Listening {
            return;
        }
        self.flush_segment();
        self.ceiling.disarm();
    }

    fn on_ceiling_elapsed(&mut self) {
        if self.state != State::Listening {
            return;
        }
        self.flush_segment();
        self.silence.disarm();
        // The backend resets its own turn state too, otherwise it keeps
        // extending a turn we already cut.
        let _ = self.channel.force_endpoint();
    }

    /// Take the assembled text, if any, and hand it to translation.
    fn flush_segment(&mut self) {
        if let Some(text) = self.segment.flush() {
            self.notify(Notice::SegmentFlushed(text.clone()));
            self.translation.translate(self.epoch, &text);
        }
    }

    fn schedule_restart(&mut self, message: String) {
        self.restart_attempts += 1;
        if self.restart_attempts > MAX_CHANNEL_RESTARTS {
            self.notify(Notice::TranscriptionSuspended(format!(
                "giving up after {} restarts: {}",
                MAX_CHANNEL_RESTARTS, message
            )));
            self.enter_idle(false);
            return;
        }
        self.notify(Notice::Error(format!(
            "transcription interrupted, restarting: {}",
            message
        )));
        self.restart_epoch = self.epoch;
        self.restart.arm(self.settings.restart_backoff);
    }

    fn on_restart_due(&mut self) {
        // A newer stop or reconfigure supersedes the scheduled restart.
        if self.state != State::Listening || self.restart_epoch != self.epoch {
            return;
        }
        let _ = self.channel.stop();
        match self.channel.start(&self.settings.channel, self.channel_tx.clone()) {
            Ok(()) => self.channel_active = true,
            Err(e) => self.schedule_restart(e.to_string()),
        }
    }

    fn enter_listening(&mut self) {
        if let Err(e) = self.transcript.ensure_session_started() {
            self.notify(Notice::Error(format!("transcript unavailable: {}", e)));
        }

        if let Err(e) = self
            .channel
            .start(&self.settings.channel, self.channel_tx.clone())
        {
            self.notify(Notice::Error(format!("transcription failed to start: {}", e)));
            return;
        }
        self.channel_active = true;

        let source = match (self.source_factory)() {
            Ok(source) => source,
            Err(e) => {
                let _ = self.channel.stop();
                self.channel_active = false;
                self.notify(Notice::Error(format!("audio unavailable: {}", e)));
                return;
            }
        };
        let deliver = self.inputs.clone();
        let deliver_err = self.inputs.clone();
        match CapturePump::start(
            source,
            self.settings.pump,
            move |chunk| {
                let _ = deliver.send(Input::Audio(chunk));
            },
            move |e| {
                let _ = deliver_err.send(Input::AudioFailed(e));
            },
        ) {
            Ok(pump) => self.pump = Some(pump),
            Err(e) => {
                let _ = self.channel.stop();
                self.channel_active = false;
                self.notify(Notice::Error(format!("audio capture failed: {}", e)));
                return;
            }
        }

        self.state = State::Listening;
        self.notify(Notice::Listening);
    }

    /// Leave Listening. When `keep_confirmed` is set (pause), confirmed text
    /// survives for the next listening period; the unconfirmed hypothesis
    /// never does.
    fn enter_idle(&mut self, keep_confirmed: bool) {
        self.epoch += 1;
        self.silence.disarm();
        self.ceiling.disarm();
        self.restart.disarm();
        self.restart_attempts = 0;
        if let Some(mut pump) = self.pump.take() {
            // Blocks until the capture thread is gone, so no chunk can reach
            // a channel that is already torn down.
            pump.stop();
        }
        let _ = self.channel.stop();
        self.channel_active = false;
        if keep_confirmed {
            self.segment.drop_pending();
        } else {
            self.segment.clear();
        }
        self.state = State::Idle;
    }

    /// Listening teardown and re-entry under new settings. Unflushed text is
    /// discarded on purpose; the old threshold's half-spoken segment does
    /// not belong to the new configuration.
    fn controlled_restart(&mut self) {
        self.enter_idle(false);
        self.enter_listening();
    }

    fn on_translation(&mut self, outcome: TranslationOutcome) {
        match outcome {
            TranslationOutcome::Ready { epoch, target } => {
                if epoch == self.epoch {
                    self.notify(Notice::TranslationReady(target));
                }
            }
            TranslationOutcome::PrepareFailed {
                epoch,
                target,
                message,
            } => {
                if epoch == self.epoch {
                    self.notify(Notice::TranslationUnavailable {
                        language: target,
                        message,
                    });
                }
            }
            TranslationOutcome::Translated {
                epoch,
                source_text,
                translated,
            } => {
                if epoch != self.epoch {
                    return;
                }
                if let Err(e) = self.transcript.append_exchange(
                    &self.settings.source_language,
                    &source_text,
                    &self.settings.target_language,
                    &translated,
                ) {
                    self.notify(Notice::Error(format!("transcript write failed: {}", e)));
                }
                self.synthesis.speak(&translated);
                self.notify(Notice::Translated {
                    original: source_text,
                    translated,
                });
            }
            TranslationOutcome::Failed {
                epoch,
                source_text,
                message,
            } => {
                if epoch == self.epoch {
                    self.notify(Notice::Error(format!(
                        "translation of {:?} failed: {}",
                        source_text, message
                    )));
                }
            }
        }
    }

    fn shutdown(&mut self, reason: &str) {
        if self.state == State::Stopped {
            return;
        }
        self.enter_idle(false);
        self.synthesis.shutdown();
        self.translation.shutdown();
        if let Err(e) = self.transcript.end_session(reason) {
            self.notify(Notice::Error(format!("transcript close failed: {}", e)));
        }
        self.state = State::Stopped;
        self.notify(Notice::Stopped);
    }
}
