//! Capture pump: polls an [`AudioSource`] on a dedicated thread and hands
//! fixed-duration PCM chunks downstream.

use crate::audio::recorder::AudioSource;
use crate::audio::AudioChunk;
use crate::defaults;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How often the pump thread polls the source for new samples.
const POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Give up after this many consecutive read failures.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Pump tuning.
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    pub sample_rate: u32,
    pub chunk_ms: u32,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            chunk_ms: defaults::CHUNK_MS,
        }
    }
}

/// Moves audio from a source to a consumer on its own thread.
///
/// The pump accumulates raw reads until a full chunk (about `chunk_ms` of
/// audio) is available, then invokes the delivery callback. For finite
/// sources the trailing partial chunk is flushed before the thread exits.
pub struct CapturePump {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CapturePump {
    /// Start pumping. The source is started on the pump thread; a start
    /// failure is reported through `deliver_err` and ends the thread.
    pub fn start<F, E>(
        mut source: Box<dyn AudioSource>,
        config: PumpConfig,
        deliver: F,
        deliver_err: E,
    ) -> Result<Self>
    where
        F: Fn(AudioChunk) + Send + 'static,
        E: Fn(crate::error::VoxflowError) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let chunk_samples =
            (config.sample_rate as u64 * config.chunk_ms as u64 / 1000).max(1) as usize;

        let handle = thread::Builder::new()
            .name("capture-pump".to_string())
            .spawn(move || {
                if let Err(e) = source.start() {
                    deliver_err(e);
                    return;
                }

                let finite = source.is_finite();
                let mut pending: Vec<i16> = Vec::with_capacity(chunk_samples * 2);
                let mut consecutive_errors = 0u32;

                while thread_running.load(Ordering::Relaxed) {
                    match source.read_samples() {
                        Ok(samples) => {
                            consecutive_errors = 0;
                            if samples.is_empty() {
                                if finite {
                                    break;
                                }
                            } else {
                                pending.extend_from_slice(&samples);
                            }
                        }
                        Err(e) => {
                            consecutive_errors += 1;
                            if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                                deliver_err(e);
                                break;
                            }
                        }
                    }

                    while pending.len() >= chunk_samples {
                        let rest = pending.split_off(chunk_samples);
                        let chunk = AudioChunk::from_samples(&pending);
                        pending = rest;
                        deliver(chunk);
                    }

                    if !finite {
                        thread::sleep(POLL_INTERVAL);
                    }
                }

                // Flush the trailing partial chunk so short files are not
                // silently truncated.
                if !pending.is_empty() && thread_running.load(Ordering::Relaxed) {
                    deliver(AudioChunk::from_samples(&pending));
                }

                if let Err(e) = source.stop() {
                    deliver_err(e);
                }
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the pump and wait for the thread to finish. No chunk is delivered
    /// after this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::Relaxed)
    }
}

impl Drop for CapturePump {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::recorder::MockAudioSource;
    use std::sync::Mutex;
    use std::time::Instant;

    fn collectors() -> (
        Arc<Mutex<Vec<AudioChunk>>>,
        Arc<Mutex<Vec<String>>>,
        impl Fn(AudioChunk) + Send + 'static,
        impl Fn(crate::error::VoxflowError) + Send + 'static,
    ) {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let chunks_in = Arc::clone(&chunks);
        let errors_in = Arc::clone(&errors);
        (
            chunks,
            errors,
            move |c| chunks_in.lock().unwrap().push(c),
            move |e| errors_in.lock().unwrap().push(e.to_string()),
        )
    }

    #[test]
    fn finite_source_yields_full_and_trailing_chunks() {
        // 16 samples/ms at 16kHz; chunk of 100ms = 1600 samples.
        let source = MockAudioSource::new().with_script(vec![vec![1i16; 1600], vec![2i16; 800]]);
        let (chunks, errors, deliver, deliver_err) = collectors();

        let mut pump = CapturePump::start(
            Box::new(source),
            PumpConfig::default(),
            deliver,
            deliver_err,
        )
        .unwrap();

        // Finite source: thread ends on its own, stop just joins.
        pump.stop();

        let chunks = chunks.lock().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].sample_count(), 1600);
        assert_eq!(chunks[1].sample_count(), 800);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn start_failure_is_reported() {
        let source = MockAudioSource::new()
            .with_start_failure()
            .with_error_message("no device");
        let (chunks, errors, deliver, deliver_err) = collectors();

        let mut pump = CapturePump::start(
            Box::new(source),
            PumpConfig::default(),
            deliver,
            deliver_err,
        )
        .unwrap();
        pump.stop();

        assert!(chunks.lock().unwrap().is_empty());
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("no device"));
    }

    #[test]
    fn stop_joins_and_no_chunks_arrive_after() {
        // Infinite-style source via a long script plus small chunk size so
        // the pump keeps producing until stopped.
        let script: Vec<Vec<i16>> = (0..200).map(|_| vec![0i16; 160]).collect();
        let source = MockAudioSource::new().with_script(script);
        let (chunks, _errors, deliver, deliver_err) = collectors();

        let mut pump = CapturePump::start(
            Box::new(source),
            PumpConfig {
                sample_rate: 16000,
                chunk_ms: 10,
            },
            deliver,
            deliver_err,
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while chunks.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        pump.stop();
        assert!(!pump.is_running());

        let count_at_stop = chunks.lock().unwrap().len();
        assert!(count_at_stop > 0);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(chunks.lock().unwrap().len(), count_at_stop);
    }
}
