//! Backends on the system camera, microphone and speakers.

use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::{
    audio::{
        capture::{start_mic_tap, MicTapOptions},
        playback::{CpalOutput, OutputDevice, PlaybackEnded},
    },
    error::{ParleyError, Result},
    ipc::events::AudioLevelEvent,
    media::{camera::CameraFeed, video::VideoSurface},
};

use super::{CaptureBackend, MediaHandle, PlaybackBackend, SessionConfig};

/// cpal microphone plus an ffmpeg camera feed.
pub struct DeviceCapture;

impl CaptureBackend for DeviceCapture {
    fn acquire<'a>(
        &'a self,
        config: &'a SessionConfig,
        level_tx: broadcast::Sender<AudioLevelEvent>,
    ) -> BoxFuture<'a, Result<MediaHandle>> {
        Box::pin(async move {
            let options = MicTapOptions {
                preferred_device: config.preferred_input_device.clone(),
                processing: config.processing,
                target_sample_rate: config.capture_sample_rate,
                block_size: config.block_size,
                open_timeout: config.acquire_timeout,
            };
            let mic = tokio::task::spawn_blocking(move || start_mic_tap(options, level_tx))
                .await
                .map_err(|e| ParleyError::Other(anyhow::anyhow!("mic open task failed: {e}")))??;

            let surface = VideoSurface::new();
            let camera = if config.camera.enabled {
                match CameraFeed::start(&config.camera, surface.clone()) {
                    Ok(feed) => Some(feed),
                    Err(e) => {
                        warn!("camera unavailable: {e}");
                        mic.stop();
                        return Err(e);
                    }
                }
            } else {
                info!("camera disabled; frame ticks will be skipped");
                None
            };

            Ok(MediaHandle::new(mic, camera, surface))
        })
    }
}

/// cpal output stream.
pub struct DevicePlayback;

impl PlaybackBackend for DevicePlayback {
    fn open(
        &self,
        config: &SessionConfig,
        ended_tx: mpsc::UnboundedSender<PlaybackEnded>,
    ) -> Result<Box<dyn OutputDevice>> {
        let output = CpalOutput::open(
            config.preferred_output_device.as_deref(),
            config.playback_sample_rate,
            ended_tx,
            config.acquire_timeout,
        )?;
        Ok(Box::new(output))
    }
}
