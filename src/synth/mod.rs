//! Speech synthesis stage: FIFO playback with immediate interruption.
//!
//! Playback is fire-and-forget from the orchestrator's side. The only hard
//! requirement is barge-in: when the user starts speaking again, anything
//! queued or playing is discarded at once so the pipeline never talks over
//! them. Playback failures are logged, never retried.

use crate::error::{Result, VoxflowError};
use crossbeam_channel::{unbounded, Sender};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A playback backend. `speak` blocks for the length of the utterance and
/// must poll `interrupted` often enough to cut playback short promptly.
pub trait SpeechSynthesizer: Send {
    fn speak(&mut self, text: &str, interrupted: &dyn Fn() -> bool) -> Result<()>;

    /// Release the underlying resource permanently.
    fn release(&mut self) {}
}

enum WorkItem {
    Speak { text: String, generation: u64 },
    Shutdown,
}

/// FIFO playback queue on a worker thread.
///
/// Every queued utterance carries the interrupt generation at enqueue time;
/// `interrupt` bumps the generation, which both drains the queue (stale
/// items are skipped) and cuts the in-flight utterance short.
pub struct SynthesisStage {
    queue: Sender<WorkItem>,
    generation: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SynthesisStage {
    pub fn spawn(mut synthesizer: Box<dyn SpeechSynthesizer>) -> Result<Self> {
        let (tx, rx) = unbounded::<WorkItem>();
        let generation = Arc::new(AtomicU64::new(0));
        let worker_generation = Arc::clone(&generation);

        let handle = thread::Builder::new()
            .name("synthesis-stage".to_string())
            .spawn(move || {
                for item in rx.iter() {
                    match item {
                        WorkItem::Speak { text, generation } => {
                            if worker_generation.load(Ordering::Acquire) > generation {
                                continue;
                            }
                            let cancelled =
                                || worker_generation.load(Ordering::Acquire) > generation;
                            if let Err(e) = synthesizer.speak(&text, &cancelled) {
                                eprintln!("voxflow: playback failed: {}", e);
                            }
                        }
                        WorkItem::Shutdown => break,
                    }
                }
                synthesizer.release();
            })?;

        Ok(Self {
            queue: tx,
            generation,
            handle: Some(handle),
        })
    }

    /// Enqueue text for playback. Non-blocking.
    pub fn speak(&self, text: &str) {
        let _ = self.queue.send(WorkItem::Speak {
            text: text.to_string(),
            generation: self.generation.load(Ordering::Acquire),
        });
    }

    /// Discard everything queued or playing.
    pub fn interrupt(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Interrupt, stop the worker, and release the backend.
    pub fn shutdown(&mut self) {
        self.interrupt();
        let _ = self.queue.send(WorkItem::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SynthesisStage {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Synthesizer backed by an external TTS command (espeak-ng by default).
/// Interruption kills the child process.
pub struct CommandSynthesizer {
    program: String,
    voice_args: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            voice_args: Vec::new(),
        }
    }

    /// Extra arguments placed before the text (voice/language selection).
    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.voice_args = args.iter().map(|s| s.to_string()).collect();
        self
    }
}

impl Default for CommandSynthesizer {
    fn default() -> Self {
        Self::new("espeak-ng")
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn speak(&mut self, text: &str, interrupted: &dyn Fn() -> bool) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.voice_args)
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VoxflowError::Synthesis {
                message: format!("failed to run {}: {}", self.program, e),
            })?;

        loop {
            if interrupted() {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(());
            }
            match child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(VoxflowError::Synthesis {
                        message: format!("{} exited with {}", self.program, status),
                    });
                }
                Ok(None) => thread::sleep(Duration::from_millis(20)),
                Err(e) => {
                    return Err(VoxflowError::Synthesis {
                        message: format!("failed to wait for {}: {}", self.program, e),
                    });
                }
            }
        }
    }
}

/// Discards all speech. Used when playback is muted.
pub struct NullSynthesizer;

impl SpeechSynthesizer for NullSynthesizer {
    fn speak(&mut self, _text: &str, _interrupted: &dyn Fn() -> bool) -> Result<()> {
        Ok(())
    }
}

/// Mock synthesizer recording what was spoken; optional per-utterance delay
/// so tests can interrupt mid-playback.
pub struct MockSynthesizer {
    spoken: Arc<std::sync::Mutex<Vec<String>>>,
    interrupted: Arc<std::sync::Mutex<Vec<String>>>,
    utterance_duration: Duration,
    released: Arc<std::sync::Mutex<bool>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            spoken: Arc::new(std::sync::Mutex::new(Vec::new())),
            interrupted: Arc::new(std::sync::Mutex::new(Vec::new())),
            utterance_duration: Duration::ZERO,
            released: Arc::new(std::sync::Mutex::new(false)),
        }
    }

    pub fn with_utterance_duration(mut self, duration: Duration) -> Self {
        self.utterance_duration = duration;
        self
    }

    pub fn spoken(&self) -> Arc<std::sync::Mutex<Vec<String>>> {
        Arc::clone(&self.spoken)
    }

    pub fn interrupted_texts(&self) -> Arc<std::sync::Mutex<Vec<String>>> {
        Arc::clone(&self.interrupted)
    }

    pub fn released_flag(&self) -> Arc<std::sync::Mutex<bool>> {
        Arc::clone(&self.released)
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSynthesizer for MockSynthesizer {
    fn speak(&mut self, text: &str, interrupted: &dyn Fn() -> bool) -> Result<()> {
        let deadline = std::time::Instant::now() + self.utterance_duration;
        while std::time::Instant::now() < deadline {
            if interrupted() {
                self.interrupted.lock().unwrap().push(text.to_string());
                return Ok(());
            }
            thread::sleep(Duration::from_millis(2));
        }
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn release(&mut self) {
        *self.released.lock().unwrap() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn wait_for<F: Fn() -> bool>(cond: F) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(cond(), "condition not reached in time");
    }

    #[test]
    fn speaks_in_fifo_order() {
        let synthesizer = MockSynthesizer::new();
        let spoken = synthesizer.spoken();
        let mut stage = SynthesisStage::spawn(Box::new(synthesizer)).unwrap();

        stage.speak("first");
        stage.speak("second");
        wait_for(|| spoken.lock().unwrap().len() == 2);
        assert_eq!(*spoken.lock().unwrap(), vec!["first", "second"]);
        stage.shutdown();
    }

    #[test]
    fn interrupt_cuts_playing_and_drains_queue() {
        let synthesizer =
            MockSynthesizer::new().with_utterance_duration(Duration::from_millis(200));
        let spoken = synthesizer.spoken();
        let cut = synthesizer.interrupted_texts();
        let mut stage = SynthesisStage::spawn(Box::new(synthesizer)).unwrap();

        stage.speak("long one");
        stage.speak("queued");
        thread::sleep(Duration::from_millis(30));
        stage.interrupt();

        wait_for(|| cut.lock().unwrap().len() == 1);
        assert_eq!(*cut.lock().unwrap(), vec!["long one"]);
        // The queued item never plays.
        thread::sleep(Duration::from_millis(100));
        assert!(spoken.lock().unwrap().is_empty());

        // New speech after the interrupt plays normally.
        stage.speak("after");
        wait_for(|| spoken.lock().unwrap().contains(&"after".to_string()));
        stage.shutdown();
    }

    #[test]
    fn shutdown_releases_backend() {
        let synthesizer = MockSynthesizer::new();
        let released = synthesizer.released_flag();
        let mut stage = SynthesisStage::spawn(Box::new(synthesizer)).unwrap();
        stage.speak("bye");
        stage.shutdown();
        assert!(*released.lock().unwrap());
    }
}
