//! Session composition: wires configuration to concrete pipeline parts.

use crate::audio::AudioSource;
use crate::channel::cloud::CloudChannel;
use crate::channel::TranscriptionChannel;
use crate::config::{Backend, Config};
use crate::error::{Result, VoxflowError};
use crate::orchestrator::{OrchestratorDeps, TurnSettings};
use crate::synth::{CommandSynthesizer, NullSynthesizer, SpeechSynthesizer};
use crate::translate::CommandTranslator;
use crate::transcript::TranscriptWriter;
use std::path::PathBuf;
use std::sync::Arc;

/// Run-time choices that are not configuration file material.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Feed a WAV file instead of the microphone.
    pub input_wav: Option<PathBuf>,
    /// TTS command override (default espeak-ng).
    pub tts_program: Option<String>,
    /// Disable audible playback entirely.
    pub mute: bool,
    /// Translator command override (default trans).
    pub translator_program: Option<String>,
}

/// Where session transcripts land when the config does not say.
fn transcript_directory(config: &Config) -> PathBuf {
    if let Some(dir) = &config.transcript.directory {
        return dir.clone();
    }
    #[cfg(feature = "cli")]
    if let Some(documents) = dirs::document_dir() {
        return documents.join("voxflow");
    }
    PathBuf::from("voxflow-transcripts")
}

fn build_channel(config: &Config) -> Result<Box<dyn TranscriptionChannel>> {
    match config.channel.backend {
        Backend::Cloud => {
            if config.channel.api_key.is_empty() {
                return Err(VoxflowError::ConfigInvalidValue {
                    key: "channel.api_key".to_string(),
                    message: "cloud backend needs an API key (VOXFLOW_API_KEY)".to_string(),
                });
            }
            Ok(Box::new(CloudChannel::new()))
        }
        // An embedded engine is platform specific; library users compose
        // channel::on_device::OnDeviceChannel with their own Recognizer.
        Backend::OnDevice => Err(VoxflowError::ConfigInvalidValue {
            key: "channel.backend".to_string(),
            message: "no on-device recognizer is bundled with the CLI".to_string(),
        }),
    }
}

fn build_source_factory(
    config: &Config,
    options: &SessionOptions,
) -> Result<Box<dyn FnMut() -> Result<Box<dyn AudioSource>> + Send>> {
    if let Some(path) = options.input_wav.clone() {
        let read_size = (config.audio.sample_rate / 10).max(1) as usize;
        return Ok(Box::new(move || {
            let source = crate::audio::WavFileSource::open(&path, read_size)?;
            Ok(Box::new(source) as Box<dyn AudioSource>)
        }));
    }

    #[cfg(feature = "cpal-audio")]
    {
        let device = config.audio.device.clone();
        let sample_rate = config.audio.sample_rate;
        return Ok(Box::new(move || {
            let source =
                crate::audio::capture::CpalAudioSource::new(device.as_deref(), sample_rate)?;
            Ok(Box::new(source) as Box<dyn AudioSource>)
        }));
    }

    #[cfg(not(feature = "cpal-audio"))]
    {
        return Err(VoxflowError::AudioCapture {
            message: "built without microphone support; use a WAV input".to_string(),
        });
    }
}

fn build_synthesizer(options: &SessionOptions) -> Box<dyn SpeechSynthesizer> {
    if options.mute {
        return Box::new(NullSynthesizer);
    }
    match &options.tts_program {
        Some(program) => Box::new(CommandSynthesizer::new(program)),
        None => Box::new(CommandSynthesizer::default()),
    }
}

/// Assemble everything the orchestrator needs for one session.
pub fn build(config: &Config, options: &SessionOptions) -> Result<(OrchestratorDeps, TurnSettings)> {
    let channel = build_channel(config)?;
    let source_factory = build_source_factory(config, options)?;
    let translator = match &options.translator_program {
        Some(program) => Box::new(CommandTranslator::new(program)),
        None => Box::new(CommandTranslator::default()),
    };
    let synthesizer = build_synthesizer(options);
    let transcript = Arc::new(TranscriptWriter::new(&transcript_directory(config)));

    let deps = OrchestratorDeps {
        channel,
        source_factory,
        translator,
        synthesizer,
        transcript,
    };
    Ok((deps, TurnSettings::from_config(config)))
}
