//! Session Recorder.
//!
//! Buffers every outbound audio segment for the session and, on stop, writes
//! them out as one WAV (16-bit mono) artifact. Stopping with nothing buffered
//! still yields a valid, header-only file.

use std::io::Cursor;

use tracing::{debug, info};

use crate::buffering::chunk::EncodedAudioChunk;
use crate::error::{ParleyError, Result};

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Consolidated audio for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    /// Samples of audio in the container (0 for an empty recording).
    pub samples: usize,
}

impl AudioArtifact {
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples as f64 / self.sample_rate as f64
    }
}

pub struct SessionRecorder {
    sample_rate: u32,
    segments: Vec<Vec<u8>>,
    recording: bool,
}

impl SessionRecorder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            segments: Vec::new(),
            recording: false,
        }
    }

    /// Begin a fresh recording, discarding anything left from a previous one.
    pub fn start(&mut self) {
        self.segments.clear();
        self.recording = true;
        debug!(sample_rate = self.sample_rate, "recorder started");
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Append one segment. Ignored while not recording.
    ///
    /// # Errors
    /// `ParleyError::Decode` for a malformed chunk, `ParleyError::Recorder`
    /// for one at a different sample rate.
    pub fn record(&mut self, chunk: &EncodedAudioChunk) -> Result<()> {
        if !self.recording {
            return Ok(());
        }
        if chunk.sample_rate() != self.sample_rate {
            return Err(ParleyError::Recorder(format!(
                "segment at {} Hz in a {} Hz recording",
                chunk.sample_rate(),
                self.sample_rate
            )));
        }
        self.segments.push(chunk.pcm_bytes()?);
        Ok(())
    }

    /// Finalize, clear the buffer and return the artifact.
    pub fn stop(&mut self) -> Result<AudioArtifact> {
        self.recording = false;
        let segments = std::mem::take(&mut self.segments);
        if segments.is_empty() {
            debug!("recorder stopped with no segments");
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut bytes = Vec::new();
        let mut samples = 0usize;
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)
                .map_err(|e| ParleyError::Recorder(e.to_string()))?;
            for segment in &segments {
                for pair in segment.chunks_exact(2) {
                    writer
                        .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                        .map_err(|e| ParleyError::Recorder(e.to_string()))?;
                    samples += 1;
                }
            }
            writer
                .finalize()
                .map_err(|e| ParleyError::Recorder(e.to_string()))?;
        }

        info!(
            segments = segments.len(),
            samples,
            bytes = bytes.len(),
            "recording finalized"
        );

        Ok(AudioArtifact {
            mime_type: WAV_MIME_TYPE.into(),
            bytes,
            sample_rate: self.sample_rate,
            samples,
        })
    }
}
