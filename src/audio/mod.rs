//! Audio capture: source trait, device capture, and the chunk pump.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod pump;
pub mod recorder;
pub mod wav;

pub use pump::{CapturePump, PumpConfig};
pub use recorder::{AudioSource, MockAudioSource};
pub use wav::WavFileSource;

/// One chunk of captured audio, handed from the capture pump to the
/// transcription channel. PCM16 little-endian mono.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    bytes: Vec<u8>,
    samples: usize,
}

impl AudioChunk {
    /// Builds a chunk from i16 samples.
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            bytes,
            samples: samples.len(),
        }
    }

    /// Raw PCM16LE payload.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the chunk, yielding the raw payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of samples in the chunk.
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Chunk duration in milliseconds at the given sample rate.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        (self.samples as u64 * 1000 / sample_rate as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_encodes_little_endian() {
        let chunk = AudioChunk::from_samples(&[1i16, -1]);
        assert_eq!(chunk.bytes(), &[0x01, 0x00, 0xFF, 0xFF]);
        assert_eq!(chunk.sample_count(), 2);
    }

    #[test]
    fn chunk_duration() {
        let chunk = AudioChunk::from_samples(&vec![0i16; 1600]);
        assert_eq!(chunk.duration_ms(16000), 100);
    }
}
