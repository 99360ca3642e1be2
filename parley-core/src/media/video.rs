//! Live video surface: the most recent camera frame, shared read-only.

use std::sync::Arc;

use parking_lot::RwLock;

/// One decoded RGB24 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB, `width * height * 3` bytes.
    pub rgb: Vec<u8>,
}

impl VideoFrame {
    /// `None` when the buffer size does not match the dimensions.
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * 3;
        (width > 0 && height > 0 && rgb.len() == expected).then_some(Self {
            width,
            height,
            rgb,
        })
    }
}

/// Latest-frame slot written by the camera feed and read by the frame
/// sampler or a preview. Clones share the slot.
#[derive(Clone, Default)]
pub struct VideoSurface {
    latest: Arc<RwLock<Option<Arc<VideoFrame>>>>,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: VideoFrame) {
        *self.latest.write() = Some(Arc::new(frame));
    }

    /// The current frame, if the feed has produced one yet.
    pub fn snapshot(&self) -> Option<Arc<VideoFrame>> {
        self.latest.read().clone()
    }

    pub fn clear(&self) {
        self.latest.write().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_mismatched_buffer() {
        assert!(VideoFrame::new(2, 2, vec![0; 12]).is_some());
        assert!(VideoFrame::new(2, 2, vec![0; 11]).is_none());
        assert!(VideoFrame::new(0, 2, vec![]).is_none());
    }

    #[test]
    fn surface_clones_share_the_latest_frame() {
        let surface = VideoSurface::new();
        let reader = surface.clone();
        assert!(reader.snapshot().is_none());

        surface.publish(VideoFrame::new(1, 1, vec![1, 2, 3]).unwrap());
        surface.publish(VideoFrame::new(1, 1, vec![4, 5, 6]).unwrap());
        assert_eq!(reader.snapshot().unwrap().rgb, vec![4, 5, 6]);

        surface.clear();
        assert!(reader.snapshot().is_none());
    }
}
