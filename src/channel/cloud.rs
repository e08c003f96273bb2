//! Cloud transcription channel: a persistent duplex WebSocket to a streaming
//! recognition service speaking the AssemblyAI v3 realtime protocol.
//!
//! The socket lives on its own thread with a single-threaded tokio runtime;
//! the rest of the crate stays synchronous and talks to it through queues.

use crate::audio::AudioChunk;
use crate::channel::{ChannelEvent, ChannelSettings, ErrorClass, TranscriptionChannel};
use crate::error::{Result, VoxflowError};
use crossbeam_channel::Sender;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;

/// How long to wait for the server's termination handshake on shutdown.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Messages the server pushes down the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerMessage {
    Begin {
        #[allow(dead_code)]
        id: String,
    },
    Turn {
        #[serde(default)]
        turn_order: u64,
        #[serde(default)]
        transcript: String,
        #[serde(default)]
        end_of_turn: bool,
        #[serde(default)]
        turn_is_formatted: bool,
    },
    Termination {},
    Error {
        #[serde(default)]
        error: String,
    },
    #[serde(other)]
    Unknown,
}

enum Outbound {
    Audio(Vec<u8>),
    ForceEndpoint,
    Terminate,
}

/// Maps raw `Turn` messages to channel events.
///
/// The server sends a turn several times: hypothesis updates, then an
/// end-of-turn message, and possibly a formatted repeat of the same turn.
/// Each final supersedes earlier text for that turn, and a repeat of an
/// already-finalized turn is dropped so a turn never lands twice.
#[derive(Debug, Default)]
struct TurnTracker {
    current_turn: Option<u64>,
    last_finalized: Option<u64>,
}

impl TurnTracker {
    fn on_turn(
        &mut self,
        turn_order: u64,
        transcript: &str,
        end_of_turn: bool,
        _formatted: bool,
    ) -> Vec<ChannelEvent> {
        let mut out = Vec::new();

        if let Some(done) = self.last_finalized
            && turn_order <= done
        {
            return out;
        }

        if !transcript.is_empty() && self.current_turn != Some(turn_order) {
            self.current_turn = Some(turn_order);
            out.push(ChannelEvent::TurnBegin);
        }

        if end_of_turn {
            let begun = self.current_turn == Some(turn_order);
            self.last_finalized = Some(turn_order);
            self.current_turn = None;
            if !transcript.is_empty() {
                out.push(ChannelEvent::Final(transcript.to_string()));
            }
            // A turn that never produced text also never began; stay silent.
            if begun || !transcript.is_empty() {
                out.push(ChannelEvent::TurnEnd);
            }
        } else if !transcript.is_empty() {
            out.push(ChannelEvent::Partial(transcript.to_string()));
        }

        out
    }
}

/// Builds the connection URL with the session parameters the protocol
/// expects as query string.
fn session_url(settings: &ChannelSettings) -> String {
    let mut url = format!(
        "{}?sample_rate={}&encoding=pcm_s16le&end_utterance_silence_threshold={}",
        settings.endpoint, settings.sample_rate, settings.silence_threshold_ms
    );
    if !settings.speech_model.is_empty() {
        url.push_str("&speech_model=");
        url.push_str(&settings.speech_model);
    }
    if settings.language_detection {
        url.push_str("&language_detection=true");
    }
    url
}

struct CloudRuntime {
    outbound: mpsc::UnboundedSender<Outbound>,
    handle: thread::JoinHandle<()>,
}

/// WebSocket-backed [`TranscriptionChannel`].
pub struct CloudChannel {
    runtime: Option<CloudRuntime>,
}

impl CloudChannel {
    pub fn new() -> Self {
        Self { runtime: None }
    }
}

impl Default for CloudChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptionChannel for CloudChannel {
    fn start(&mut self, settings: &ChannelSettings, events: Sender<ChannelEvent>) -> Result<()> {
        if self.runtime.is_some() {
            self.stop()?;
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let settings = settings.clone();

        let handle = thread::Builder::new()
            .name("cloud-channel".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = events.send(ChannelEvent::Error {
                            class: ErrorClass::Fatal,
                            message: format!("failed to start socket runtime: {}", e),
                        });
                        return;
                    }
                };
                runtime.block_on(run_socket(settings, events, outbound_rx));
            })?;

        self.runtime = Some(CloudRuntime {
            outbound: outbound_tx,
            handle,
        });
        Ok(())
    }

    fn send_audio(&mut self, chunk: AudioChunk) -> Result<()> {
        if let Some(runtime) = &self.runtime {
            let _ = runtime.outbound.send(Outbound::Audio(chunk.into_bytes()));
        }
        Ok(())
    }

    fn force_endpoint(&mut self) -> Result<()> {
        if let Some(runtime) = &self.runtime {
            let _ = runtime.outbound.send(Outbound::ForceEndpoint);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(runtime) = self.runtime.take() {
            let _ = runtime.outbound.send(Outbound::Terminate);
            drop(runtime.outbound);
            runtime.handle.join().map_err(|_| VoxflowError::Channel {
                message: "socket thread panicked".to_string(),
            })?;
        }
        Ok(())
    }
}

impl Drop for CloudChannel {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Classify a handshake failure. Auth rejections will not heal on retry.
fn classify_connect_error(err: &WsError) -> ErrorClass {
    match err {
        WsError::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                ErrorClass::Fatal
            } else {
                ErrorClass::Transient
            }
        }
        _ => ErrorClass::Transient,
    }
}

async fn run_socket(
    settings: ChannelSettings,
    events: Sender<ChannelEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let url = session_url(&settings);
    let mut request = match url.as_str().into_client_request() {
        Ok(req) => req,
        Err(e) => {
            let _ = events.send(ChannelEvent::Error {
                class: ErrorClass::Fatal,
                message: format!("bad endpoint {}: {}", url, e),
            });
            return;
        }
    };
    if !settings.api_key.is_empty()
        && let Ok(value) = settings.api_key.parse()
    {
        request.headers_mut().insert("Authorization", value);
    }

    let (mut socket, _response) = match connect_async(request).await {
        Ok(ok) => ok,
        Err(e) => {
            let _ = events.send(ChannelEvent::Error {
                class: classify_connect_error(&e),
                message: format!("connect failed: {}", e),
            });
            return;
        }
    };

    let mut tracker = TurnTracker::default();
    let mut terminating = false;

    loop {
        tokio::select! {
            cmd = outbound.recv() => {
                let cmd = match cmd {
                    Some(cmd) => cmd,
                    // Channel handle dropped without an explicit stop.
                    None => Outbound::Terminate,
                };
                let send_result = match cmd {
                    Outbound::Audio(bytes) => socket.send(Message::Binary(bytes)).await,
                    Outbound::ForceEndpoint => {
                        socket.send(Message::Text(r#"{"type":"ForceEndpoint"}"#.to_string())).await
                    }
                    Outbound::Terminate => {
                        terminating = true;
                        let sent = socket
                            .send(Message::Text(r#"{"type":"Terminate"}"#.to_string()))
                            .await;
                        // Drain until the server acknowledges or the grace
                        // period runs out.
                        if sent.is_ok() {
                            let _ = tokio::time::timeout(TERMINATE_GRACE, async {
                                while let Some(Ok(msg)) = socket.next().await {
                                    if matches!(msg, Message::Close(_)) {
                                        break;
                                    }
                                    if let Message::Text(text) = msg
                                        && matches!(
                                            serde_json::from_str::<ServerMessage>(&text),
                                            Ok(ServerMessage::Termination {})
                                        )
                                    {
                                        break;
                                    }
                                }
                            })
                            .await;
                        }
                        let _ = events.send(ChannelEvent::Closed);
                        return;
                    }
                };
                if let Err(e) = send_result
                    && !terminating
                {
                    let _ = events.send(ChannelEvent::Error {
                        class: ErrorClass::Transient,
                        message: format!("socket send failed: {}", e),
                    });
                    return;
                }
            }
            msg = socket.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(ServerMessage::Begin { .. }) => {
                                let _ = events.send(ChannelEvent::Opened);
                            }
                            Ok(ServerMessage::Turn {
                                turn_order,
                                transcript,
                                end_of_turn,
                                turn_is_formatted,
                            }) => {
                                for event in tracker.on_turn(
                                    turn_order,
                                    &transcript,
                                    end_of_turn,
                                    turn_is_formatted,
                                ) {
                                    let _ = events.send(event);
                                }
                            }
                            Ok(ServerMessage::Termination {}) => {
                                let _ = events.send(ChannelEvent::Closed);
                                return;
                            }
                            Ok(ServerMessage::Error { error }) => {
                                let _ = events.send(ChannelEvent::Error {
                                    class: ErrorClass::Transient,
                                    message: error,
                                });
                                return;
                            }
                            Ok(ServerMessage::Unknown) | Err(_) => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events.send(ChannelEvent::Error {
                            class: ErrorClass::Transient,
                            message: "server closed the session".to_string(),
                        });
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = events.send(ChannelEvent::Error {
                            class: ErrorClass::Transient,
                            message: format!("socket error: {}", e),
                        });
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChannelSettings {
        ChannelSettings {
            endpoint: "wss://streaming.example.com/v3/ws".to_string(),
            api_key: "k".to_string(),
            language: "en".to_string(),
            speech_model: "universal-streaming-multilingual".to_string(),
            language_detection: true,
            sample_rate: 16000,
            silence_threshold_ms: 700,
        }
    }

    #[test]
    fn session_url_carries_audio_and_model_parameters() {
        assert_eq!(
            session_url(&settings()),
            "wss://streaming.example.com/v3/ws?sample_rate=16000&encoding=pcm_s16le\
             &end_utterance_silence_threshold=700\
             &speech_model=universal-streaming-multilingual&language_detection=true"
        );
    }

    #[test]
    fn session_url_omits_detection_when_disabled() {
        let mut settings = settings();
        settings.language_detection = false;
        settings.speech_model = String::new();
        assert_eq!(
            session_url(&settings),
            "wss://streaming.example.com/v3/ws?sample_rate=16000&encoding=pcm_s16le&end_utterance_silence_threshold=700"
        );
    }

    #[test]
    fn parses_turn_message() {
        let json = r#"{"type":"Turn","turn_order":3,"transcript":"hello","end_of_turn":false,"turn_is_formatted":false}"#;
        match serde_json::from_str::<ServerMessage>(json).unwrap() {
            ServerMessage::Turn {
                turn_order,
                transcript,
                end_of_turn,
                ..
            } => {
                assert_eq!(turn_order, 3);
                assert_eq!(transcript, "hello");
                assert!(!end_of_turn);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn unknown_message_types_are_tolerated() {
        let json = r#"{"type":"SomethingNew","payload":1}"#;
        assert!(matches!(
            serde_json::from_str::<ServerMessage>(json).unwrap(),
            ServerMessage::Unknown
        ));
    }

    #[test]
    fn tracker_emits_turn_begin_then_partials_then_final() {
        let mut tracker = TurnTracker::default();

        let events = tracker.on_turn(0, "hel", false, false);
        assert_eq!(
            events,
            vec![
                ChannelEvent::TurnBegin,
                ChannelEvent::Partial("hel".to_string())
            ]
        );

        let events = tracker.on_turn(0, "hello", false, false);
        assert_eq!(events, vec![ChannelEvent::Partial("hello".to_string())]);

        let events = tracker.on_turn(0, "hello world", true, false);
        assert_eq!(
            events,
            vec![
                ChannelEvent::Final("hello world".to_string()),
                ChannelEvent::TurnEnd
            ]
        );
    }

    #[test]
    fn tracker_closes_a_begun_turn_even_without_final_text() {
        let mut tracker = TurnTracker::default();
        tracker.on_turn(0, "hi", false, false);

        let events = tracker.on_turn(0, "", true, false);
        assert_eq!(events, vec![ChannelEvent::TurnEnd]);
    }

    #[test]
    fn tracker_drops_formatted_repeat_of_finalized_turn() {
        let mut tracker = TurnTracker::default();
        tracker.on_turn(0, "hello world", true, false);

        // The formatted repeat supersedes nothing once the turn is final.
        let events = tracker.on_turn(0, "Hello, world.", true, true);
        assert!(events.is_empty());

        // The next turn is tracked fresh.
        let events = tracker.on_turn(1, "next", false, false);
        assert_eq!(
            events,
            vec![
                ChannelEvent::TurnBegin,
                ChannelEvent::Partial("next".to_string())
            ]
        );
    }

    #[test]
    fn tracker_skips_empty_transcripts() {
        let mut tracker = TurnTracker::default();
        assert!(tracker.on_turn(0, "", false, false).is_empty());
        // Empty final still closes the turn without emitting text.
        assert!(tracker.on_turn(0, "", true, false).is_empty());
        assert_eq!(tracker.last_finalized, Some(0));
    }
}
