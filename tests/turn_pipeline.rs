//! End-to-end endpointing behavior through the public orchestrator API,
//! with scripted channel, translator, and synthesizer.

use crossbeam_channel::{unbounded, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use voxflow::audio::MockAudioSource;
use voxflow::channel::{ChannelEvent, MockChannel, MockChannelHandle};
use voxflow::config::Config;
use voxflow::orchestrator::{Command, Notice, OrchestratorDeps, OrchestratorHandle, TurnSettings};
use voxflow::synth::MockSynthesizer;
use voxflow::translate::MockTranslator;
use voxflow::transcript::TranscriptWriter;

struct Pipeline {
    handle: OrchestratorHandle,
    channel: MockChannelHandle,
    notices: Receiver<Notice>,
    transcript: Arc<TranscriptWriter>,
    _dir: TempDir,
}

fn pipeline(threshold_ms: u32, ceiling_ms: u32) -> Pipeline {
    let dir = TempDir::new().unwrap();
    let transcript = Arc::new(TranscriptWriter::new(dir.path()));
    let channel = MockChannel::new();
    let channel_handle = channel.handle();

    let mut settings = TurnSettings::from_config(&Config::default());
    settings.silence_threshold_ms = threshold_ms;
    settings.max_segment_ms = ceiling_ms;

    let deps = OrchestratorDeps {
        channel: Box::new(channel),
        source_factory: Box::new(|| Ok(Box::new(MockAudioSource::new().with_script(Vec::new())))),
        translator: Box::new(MockTranslator::new()),
        synthesizer: Box::new(MockSynthesizer::new()),
        transcript: Arc::clone(&transcript),
    };

    let (tx, rx) = unbounded();
    let handle = OrchestratorHandle::spawn(deps, settings, tx).unwrap();
    handle.send(Command::Start);
    wait_for(&rx, |n| matches!(n, Notice::Listening));

    Pipeline {
        handle,
        channel: channel_handle,
        notices: rx,
        transcript,
        _dir: dir,
    }
}

fn wait_for<F>(rx: &Receiver<Notice>, matcher: F) -> Notice
where
    F: Fn(&Notice) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if let Ok(notice) = rx.recv_timeout(Duration::from_millis(100))
            && matcher(&notice)
        {
            return notice;
        }
    }
    panic!("expected notice not observed");
}

#[test]
fn silence_flush_fires_threshold_after_the_last_final() {
    let mut p = pipeline(500, 60_000);

    let start = Instant::now();
    p.channel.emit(ChannelEvent::Final("hello".to_string()));
    std::thread::sleep(Duration::from_millis(100));
    p.channel.emit(ChannelEvent::Final("world".to_string()));

    let flushed = wait_for(&p.notices, |n| matches!(n, Notice::SegmentFlushed(_)));
    let elapsed = start.elapsed();

    assert_eq!(flushed, Notice::SegmentFlushed("hello world".to_string()));
    // Rearmed by the second final: roughly 100ms + 500ms from the start.
    assert!(elapsed >= Duration::from_millis(590), "fired at {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1200), "fired at {:?}", elapsed);

    p.handle.stop();
}

#[test]
fn lone_partial_flushes_as_fallback_at_the_threshold() {
    let mut p = pipeline(500, 60_000);

    let start = Instant::now();
    p.channel.emit(ChannelEvent::Partial("hi".to_string()));

    let flushed = wait_for(&p.notices, |n| matches!(n, Notice::SegmentFlushed(_)));
    assert_eq!(flushed, Notice::SegmentFlushed("hi".to_string()));
    assert!(start.elapsed() >= Duration::from_millis(490));

    p.handle.stop();
}

#[test]
fn rapid_finals_are_cut_by_the_segment_ceiling() {
    // Finals every 200ms never let a 500ms silence window elapse; the
    // 1500ms ceiling cuts the segment and resets the backend turn.
    let mut p = pipeline(500, 1500);

    let start = Instant::now();
    let feeder = p.channel.clone();
    let feeding = std::thread::spawn(move || {
        for i in 0..6 {
            feeder.emit(ChannelEvent::Final(format!("w{}", i)));
            std::thread::sleep(Duration::from_millis(200));
        }
    });

    let flushed = wait_for(&p.notices, |n| matches!(n, Notice::SegmentFlushed(_)));
    let elapsed = start.elapsed();
    feeding.join().unwrap();

    match flushed {
        Notice::SegmentFlushed(text) => {
            // Everything accumulated before the ceiling is in the flush.
            assert!(text.starts_with("w0 w1 w2 w3"), "flushed: {}", text);
        }
        _ => unreachable!(),
    }
    assert!(elapsed >= Duration::from_millis(1490), "fired at {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2300), "fired at {:?}", elapsed);
    assert!(p.channel.force_endpoint_count() >= 1);

    p.handle.stop();
}

#[test]
fn session_transcript_records_each_translated_segment() {
    let mut p = pipeline(150, 60_000);

    p.channel.emit(ChannelEvent::Final("first segment".to_string()));
    wait_for(&p.notices, |n| matches!(n, Notice::Translated { .. }));

    p.channel.emit(ChannelEvent::Final("second segment".to_string()));
    wait_for(&p.notices, |n| {
        matches!(n, Notice::Translated { original, .. } if original == "second segment")
    });

    let path = p.transcript.current_path().unwrap();
    p.handle.stop();

    let contents = std::fs::read_to_string(path).unwrap();
    assert!(contents.contains("--- session started"));
    assert!(contents.contains("[EN]: first segment"));
    assert!(contents.contains("[IT]: [first segment]"));
    assert!(contents.contains("[EN]: second segment"));
    assert!(contents.contains("--- session ended (user stop)"));
}

#[test]
fn pause_resume_and_force_cut_round_trip() {
    let mut p = pipeline(5000, 60_000);

    p.channel.emit(ChannelEvent::Final("hold this".to_string()));
    wait_for(&p.notices, |n| matches!(n, Notice::Final(_)));

    p.handle.send(Command::Pause);
    wait_for(&p.notices, |n| matches!(n, Notice::Paused));
    assert_eq!(p.channel.stop_count(), 1);

    p.handle.send(Command::Start);
    wait_for(&p.notices, |n| matches!(n, Notice::Listening));
    assert_eq!(p.channel.start_count(), 2);

    p.handle.send(Command::ForceEndTurn);
    let flushed = wait_for(&p.notices, |n| matches!(n, Notice::SegmentFlushed(_)));
    assert_eq!(flushed, Notice::SegmentFlushed("hold this".to_string()));

    p.handle.stop();
}

#[test]
fn target_language_change_restarts_listening() {
    let mut p = pipeline(5000, 60_000);

    p.handle.send(Command::SetTargetLanguage("pt".to_string()));
    wait_for(&p.notices, |n| matches!(n, Notice::Listening));
    assert_eq!(p.channel.start_count(), 2);
    wait_for(&p.notices, |n| {
        matches!(n, Notice::TranslationReady(lang) if lang == "pt")
    });

    p.handle.stop();
}
