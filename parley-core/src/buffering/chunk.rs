//! Audio units that move between the capture, transport and playback stages.

use crate::audio::pcm;
use crate::error::Result;

/// A fixed-length block of mono samples in [-1.0, 1.0] produced once per
/// capture tick. Owned by the tap until it is encoded, then dropped.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    /// Sample rate in Hz (16000 on the transmission path).
    pub sample_rate: u32,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Root-mean-square level of the block in [0.0, 1.0].
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }

    /// Encode to PCM16LE and then to transport text.
    pub fn encode(&self) -> EncodedAudioChunk {
        EncodedAudioChunk::from_pcm(&pcm::encode_pcm16(&self.samples), self.sample_rate)
    }
}

/// Transport-safe PCM16LE audio plus the rate it was encoded at.
///
/// Immutable once built. Moves capture → session → network on the way out and
/// network → session → playback on the way in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioChunk {
    data: String,
    sample_rate: u32,
}

impl EncodedAudioChunk {
    /// Wrap transport text received from the network.
    pub fn new(data: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            sample_rate,
        }
    }

    /// Text-encode raw PCM16LE bytes.
    pub fn from_pcm(pcm_bytes: &[u8], sample_rate: u32) -> Self {
        Self::new(pcm::to_transport(pcm_bytes), sample_rate)
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Raw PCM16LE bytes.
    ///
    /// # Errors
    /// `ParleyError::Decode` when the transport text is malformed.
    pub fn pcm_bytes(&self) -> Result<Vec<u8>> {
        pcm::from_transport(&self.data)
    }

    /// Decoded f32 samples at [`Self::sample_rate`].
    pub fn decode(&self) -> Result<Vec<f32>> {
        Ok(pcm::decode_pcm16(&self.pcm_bytes()?))
    }
}

/// A decoded buffer and where it sits on the output timeline.
///
/// Owned by the playback side from scheduling until the buffer finishes.
#[derive(Debug, Clone)]
pub struct PlaybackSlot {
    /// Monotonic id, echoed back when the slot finishes playing.
    pub id: u64,
    /// Intended start on the output clock, in seconds.
    pub start_time: f64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackSlot {
    /// Duration of the buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_encodes_to_two_bytes_per_sample() {
        let block = AudioBlock::new(vec![0.1; 4096], 16_000);
        let chunk = block.encode();
        assert_eq!(chunk.sample_rate(), 16_000);
        assert_eq!(chunk.pcm_bytes().expect("pcm").len(), 8192);
    }

    #[test]
    fn rms_of_constant_block_is_its_magnitude() {
        let block = AudioBlock::new(vec![-0.5; 128], 16_000);
        approx::assert_abs_diff_eq!(block.rms(), 0.5, epsilon = 1e-6);
        assert_eq!(AudioBlock::new(vec![], 16_000).rms(), 0.0);
    }

    #[test]
    fn slot_duration_follows_sample_rate() {
        let slot = PlaybackSlot {
            id: 0,
            start_time: 1.0,
            samples: vec![0.0; 12_000],
            sample_rate: 24_000,
        };
        approx::assert_abs_diff_eq!(slot.duration_secs(), 0.5);
        approx::assert_abs_diff_eq!(slot.end_time(), 1.5);
    }
}
