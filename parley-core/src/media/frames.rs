//! Frame Sampler.
//!
//! Each tick grabs the current video surface as a [`PendingFrame`]. The
//! event loop JPEG-encodes it on a blocking thread and hands the result back
//! to be appended to the session's [`FrameSequence`]. A surface with no
//! frame yet, or a frame that fails to encode, just skips the tick.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tracing::{debug, warn};

use crate::media::video::{VideoFrame, VideoSurface};

/// Upper bound on frames handed to the analysis collaborator.
pub const MAX_ANALYSIS_FRAMES: usize = 10;

/// One compressed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillFrame {
    pub captured_at: DateTime<Utc>,
    pub jpeg: Vec<u8>,
}

impl StillFrame {
    pub const MIME_TYPE: &'static str = "image/jpeg";
}

/// Ordered, append-only list of snapshots for one session.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<StillFrame>,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: StillFrame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[StillFrame] {
        &self.frames
    }
}

/// Evenly thin `frames` down to at most [`MAX_ANALYSIS_FRAMES`].
///
/// Keeps every `ceil(N / 10)`-th frame starting at index 0 when `N > 10`,
/// otherwise returns the input unchanged.
pub fn subsample_frames<T: Clone>(frames: &[T]) -> Vec<T> {
    let n = frames.len();
    if n <= MAX_ANALYSIS_FRAMES {
        return frames.to_vec();
    }
    let step = n.div_ceil(MAX_ANALYSIS_FRAMES);
    frames.iter().step_by(step).cloned().collect()
}

/// Turns surface snapshots into [`StillFrame`]s.
pub struct FrameSampler {
    surface: VideoSurface,
    quality: u8,
    sequence: FrameSequence,
    skipped: u64,
}

impl FrameSampler {
    /// `quality` is the JPEG quality in 1..=100.
    pub fn new(surface: VideoSurface, quality: u8) -> Self {
        Self {
            surface,
            quality: quality.clamp(1, 100),
            sequence: FrameSequence::new(),
            skipped: 0,
        }
    }

    /// Snapshot the surface for this tick. `None`, counted as skipped, when
    /// the surface has no frame yet.
    pub fn snapshot(&mut self) -> Option<PendingFrame> {
        let Some(frame) = self.surface.snapshot() else {
            self.skip("surface not ready");
            return None;
        };
        Some(PendingFrame {
            captured_at: Utc::now(),
            frame,
            quality: self.quality,
        })
    }

    /// Append an encoded snapshot. Returns whether a frame was appended.
    pub fn complete(&mut self, encoded: image::ImageResult<StillFrame>) -> bool {
        match encoded {
            Ok(still) => {
                self.sequence.push(still);
                true
            }
            Err(e) => {
                self.skipped += 1;
                warn!("frame tick skipped: {e}");
                false
            }
        }
    }

    pub fn skip(&mut self, reason: &str) {
        self.skipped += 1;
        debug!(reason, "frame tick skipped");
    }

    pub fn sequence(&self) -> &FrameSequence {
        &self.sequence
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Hand over everything captured so far, leaving an empty sequence.
    pub fn take_sequence(&mut self) -> FrameSequence {
        std::mem::take(&mut self.sequence)
    }
}

/// A snapshot waiting to be compressed.
pub struct PendingFrame {
    captured_at: DateTime<Utc>,
    frame: Arc<VideoFrame>,
    quality: u8,
}

impl PendingFrame {
    /// CPU-bound; run it off the event loop.
    pub fn encode(self) -> image::ImageResult<StillFrame> {
        Ok(StillFrame {
            captured_at: self.captured_at,
            jpeg: encode_jpeg(&self.frame, self.quality)?,
        })
    }
}

pub fn encode_jpeg(frame: &VideoFrame, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).write_image(
        &frame.rgb,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsample_twenty_three_keeps_every_third() {
        let frames: Vec<usize> = (0..23).collect();
        let picked = subsample_frames(&frames);
        assert_eq!(picked, vec![0, 3, 6, 9, 12, 15, 18, 21]);
    }

    #[test]
    fn subsample_passes_small_sequences_unchanged() {
        let frames: Vec<usize> = (0..7).collect();
        assert_eq!(subsample_frames(&frames), frames);
        let ten: Vec<usize> = (0..10).collect();
        assert_eq!(subsample_frames(&ten), ten);
        assert!(subsample_frames::<usize>(&[]).is_empty());
    }

    #[test]
    fn subsample_never_exceeds_cap() {
        for n in 11..200usize {
            let frames: Vec<usize> = (0..n).collect();
            let picked = subsample_frames(&frames);
            assert!(picked.len() <= MAX_ANALYSIS_FRAMES, "n={n}");
            assert_eq!(picked[0], 0);
        }
    }

    #[test]
    fn tick_without_a_frame_is_skipped() {
        let mut sampler = FrameSampler::new(VideoSurface::new(), 60);
        assert!(sampler.snapshot().is_none());
        assert!(sampler.sequence().is_empty());
        assert_eq!(sampler.skipped(), 1);
    }

    #[test]
    fn encoded_snapshots_are_appended_in_order() {
        let surface = VideoSurface::new();
        surface.publish(VideoFrame::new(8, 8, vec![128; 8 * 8 * 3]).unwrap());
        let mut sampler = FrameSampler::new(surface, 60);

        let first = sampler.snapshot().expect("frame ready");
        let second = sampler.snapshot().expect("frame ready");
        assert!(sampler.complete(first.encode()));
        assert!(sampler.complete(second.encode()));

        let seq = sampler.take_sequence();
        assert_eq!(seq.len(), 2);
        assert!(seq.frames()[0].captured_at <= seq.frames()[1].captured_at);
        // SOI marker
        assert_eq!(&seq.frames()[0].jpeg[..2], &[0xFF, 0xD8]);
        assert!(sampler.sequence().is_empty());
    }

    #[test]
    fn failed_encode_counts_as_skipped() {
        let mut sampler = FrameSampler::new(VideoSurface::new(), 60);
        let err = image::ImageError::Parameter(image::error::ParameterError::from_kind(
            image::error::ParameterErrorKind::DimensionMismatch,
        ));
        assert!(!sampler.complete(Err(err)));
        assert_eq!(sampler.skipped(), 1);
        assert!(sampler.sequence().is_empty());
    }
}
