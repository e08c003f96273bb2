//! WAV file audio source, used for piping recorded audio through the
//! pipeline in tests and offline runs.

use crate::audio::recorder::AudioSource;
use crate::error::{Result, VoxflowError};
use std::path::Path;

/// Finite audio source backed by a WAV file.
///
/// The file must be 16-bit PCM. Multi-channel files are mixed down to mono.
/// Each `read_samples` call hands out one fixed-size slice of the file so the
/// pump sees a realistic stream instead of one giant buffer.
pub struct WavFileSource {
    samples: Vec<i16>,
    position: usize,
    read_size: usize,
    sample_rate: u32,
    started: bool,
}

impl WavFileSource {
    pub fn open(path: &Path, read_size: usize) -> Result<Self> {
        let mut reader = hound::WavReader::open(path).map_err(|e| VoxflowError::AudioCapture {
            message: format!("Failed to open WAV file {}: {}", path.display(), e),
        })?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(VoxflowError::AudioFormatMismatch {
                expected: "16-bit PCM".to_string(),
                actual: format!("{}-bit {:?}", spec.bits_per_sample, spec.sample_format),
            });
        }

        let channels = spec.channels as usize;
        let raw: Vec<i16> = reader
            .samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| VoxflowError::AudioCapture {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        let samples = if channels <= 1 {
            raw
        } else {
            raw.chunks_exact(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / channels as i32) as i16
                })
                .collect()
        };

        Ok(Self {
            samples,
            position: 0,
            read_size: read_size.max(1),
            sample_rate: spec.sample_rate,
            started: false,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len_samples(&self) -> usize {
        self.samples.len()
    }
}

impl AudioSource for WavFileSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if !self.started || self.position >= self.samples.len() {
            return Ok(Vec::new());
        }
        let end = (self.position + self.read_size).min(self.samples.len());
        let out = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(out)
    }

    fn is_finite(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write_wav(channels: u16, samples: &[i16]) -> NamedTempFile {
        let file = NamedTempFile::with_suffix(".wav").unwrap();
        let spec = hound::WavSpec {
            channels,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    #[test]
    fn reads_mono_file_in_chunks() {
        let file = write_wav(1, &[1, 2, 3, 4, 5]);
        let mut source = WavFileSource::open(file.path(), 2).unwrap();
        assert_eq!(source.sample_rate(), 16000);
        assert_eq!(source.len_samples(), 5);

        source.start().unwrap();
        assert_eq!(source.read_samples().unwrap(), vec![1, 2]);
        assert_eq!(source.read_samples().unwrap(), vec![3, 4]);
        assert_eq!(source.read_samples().unwrap(), vec![5]);
        assert!(source.read_samples().unwrap().is_empty());
        assert!(source.is_finite());
    }

    #[test]
    fn mixes_stereo_to_mono() {
        let file = write_wav(2, &[100, 200, 300, 500]);
        let mut source = WavFileSource::open(file.path(), 16).unwrap();
        source.start().unwrap();
        assert_eq!(source.read_samples().unwrap(), vec![150, 400]);
    }

    #[test]
    fn no_samples_before_start() {
        let file = write_wav(1, &[1, 2, 3]);
        let mut source = WavFileSource::open(file.path(), 16).unwrap();
        assert!(source.read_samples().unwrap().is_empty());
    }

    #[test]
    fn rejects_missing_file() {
        let result = WavFileSource::open(Path::new("/nonexistent/audio.wav"), 16);
        assert!(result.is_err());
    }
}
