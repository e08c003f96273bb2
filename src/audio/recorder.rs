use crate::error::{Result, VoxflowError};

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read whatever audio samples the source has accumulated.
    ///
    /// Returns an empty vector when nothing is available yet; a finite source
    /// returns an empty vector once exhausted.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Whether the source ends on its own (file/pipe) or runs until stopped
    /// (microphone).
    fn is_finite(&self) -> bool {
        false
    }
}

/// Mock audio source for testing
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    script: Vec<Vec<i16>>,
    next: usize,
    should_fail_start: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create a new mock audio source with default settings
    pub fn new() -> Self {
        Self {
            is_started: false,
            script: vec![vec![0i16; 1600]],
            next: 0,
            should_fail_start: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Configure the mock to hand out the given reads in order, then empty.
    pub fn with_script(mut self, script: Vec<Vec<i16>>) -> Self {
        self.script = script;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(VoxflowError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.next >= self.script.len() {
            return Ok(Vec::new());
        }
        let samples = self.script[self.next].clone();
        self.next += 1;
        Ok(samples)
    }

    fn is_finite(&self) -> bool {
        true
    }
}
