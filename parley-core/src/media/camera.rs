//! Camera feed.
//!
//! Launches `ffmpeg` reading the platform camera and writing raw RGB24 frames
//! to stdout, then publishes each complete frame to a [`VideoSurface`]. The
//! child is killed on drop, so losing the feed never leaks a process.

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ParleyError, Result};
use crate::media::video::{VideoFrame, VideoSurface};

/// How to open the camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    pub enabled: bool,
    pub ffmpeg_path: String,
    /// ffmpeg input format (`v4l2`, `avfoundation`, `dshow`).
    pub input_format: String,
    /// Device as ffmpeg expects it for `input_format`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let (input_format, device) = platform_default_input();
        Self {
            enabled: true,
            ffmpeg_path: "ffmpeg".into(),
            input_format: input_format.into(),
            device: device.into(),
            width: 640,
            height: 480,
            fps: 15,
        }
    }
}

fn platform_default_input() -> (&'static str, &'static str) {
    if cfg!(target_os = "macos") {
        ("avfoundation", "0:none")
    } else if cfg!(target_os = "windows") {
        ("dshow", "video=Integrated Camera")
    } else {
        ("v4l2", "/dev/video0")
    }
}

impl CameraConfig {
    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// A running camera process feeding a video surface.
pub struct CameraFeed {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    surface: VideoSurface,
}

impl CameraFeed {
    /// Spawn ffmpeg and start publishing frames to `surface`.
    ///
    /// # Errors
    /// `ParleyError::PermissionDenied` when the process cannot be started;
    /// device access problems surface later as a feed that never produces a
    /// frame (frame sampling skips those ticks).
    pub fn start(config: &CameraConfig, surface: VideoSurface) -> Result<Self> {
        if config.frame_bytes() == 0 {
            return Err(ParleyError::Camera("camera size must be non-zero".into()));
        }

        let mut child = Command::new(&config.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", &config.input_format])
            .args(["-framerate", &config.fps.to_string()])
            .args(["-video_size", &format!("{}x{}", config.width, config.height)])
            .args(["-i", &config.device])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", config.width, config.height)])
            .arg("-")
            .kill_on_drop(true)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                ParleyError::PermissionDenied(format!(
                    "failed to launch camera reader '{}': {e}",
                    config.ffmpeg_path
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ParleyError::Camera("camera reader has no stdout".into()))?;

        info!(
            pid = ?child.id(),
            device = config.device.as_str(),
            width = config.width,
            height = config.height,
            fps = config.fps,
            "camera feed started"
        );

        let reader = tokio::spawn(read_frames(
            stdout,
            config.width,
            config.height,
            surface.clone(),
        ));

        Ok(Self {
            child: Some(child),
            reader: Some(reader),
            surface,
        })
    }

    pub fn surface(&self) -> &VideoSurface {
        &self.surface
    }

    /// Check if the process is still running (non-blocking).
    pub fn is_running(&mut self) -> bool {
        match &mut self.child {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    warn!("camera reader exited with: {status}");
                    self.child = None;
                    false
                }
                Err(e) => {
                    warn!("failed to check camera reader status: {e}");
                    false
                }
            },
            None => false,
        }
    }

    /// Kill the process and clear the surface. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.take() {
            info!(pid = ?child.id(), "stopping camera feed");
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
        self.surface.clear();
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_frames<R>(mut stdout: R, width: u32, height: u32, surface: VideoSurface)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let frame_bytes = width as usize * height as usize * 3;
    let mut buf = vec![0u8; frame_bytes];
    let mut frames = 0u64;
    loop {
        match stdout.read_exact(&mut buf).await {
            Ok(_) => {
                if let Some(frame) = VideoFrame::new(width, height, buf.clone()) {
                    surface.publish(frame);
                    frames += 1;
                }
            }
            Err(e) => {
                debug!(frames, "camera stream ended: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_publishes_whole_frames_only() {
        let surface = VideoSurface::new();
        // Two 1x2 frames plus a trailing partial frame.
        let mut bytes = vec![10u8; 6];
        bytes.extend(vec![20u8; 6]);
        bytes.extend(vec![30u8; 4]);

        read_frames(&bytes[..], 1, 2, surface.clone()).await;
        let frame = surface.snapshot().expect("frame published");
        assert_eq!(frame.rgb, vec![20u8; 6]);
    }

    #[tokio::test]
    async fn missing_binary_is_permission_denied() {
        let config = CameraConfig {
            ffmpeg_path: "/nonexistent/parley-ffmpeg".into(),
            ..CameraConfig::default()
        };
        let err = CameraFeed::start(&config, VideoSurface::new())
            .err()
            .expect("spawn must fail");
        assert!(matches!(err, ParleyError::PermissionDenied(_)));
    }
}
