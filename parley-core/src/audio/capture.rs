//! Microphone capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** block on a mutex or perform I/O, so it only downmixes into
//! a reusable scratch buffer and pushes into the SPSC ring producer.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms. [`start_mic_tap`] therefore
//! opens the stream *inside* the `spawn_blocking` closure that also runs the
//! tap loop, and drops it there. A sync oneshot carries the open result back
//! to the caller, bounded by the acquire timeout.

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

#[cfg(feature = "audio-cpal")]
use tracing::{error, warn};

use crate::{
    audio::tap::{self, TapContext, TapDiagnostics, TapSink, TapSnapshot},
    buffering::{create_audio_ring, AudioProducer},
    error::{ParleyError, Result},
    ipc::events::AudioLevelEvent,
};

#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;

/// Processing the capture device is asked to apply where it supports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProcessing {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioProcessing {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Handle to an open input stream.
///
/// **Not `Send`**: create and drop it on the same OS thread.
pub struct MicCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl MicCapture {
    /// Open an input device by preferred name, falling back to the default
    /// device and then the best-scoring microphone.
    ///
    /// # Errors
    /// `ParleyError::PermissionDenied` when no usable input exists or the OS
    /// refuses access; `ParleyError::AudioStream` for other stream failures.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
        processing: AudioProcessing,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| ParleyError::PermissionDenied(format!("input enumeration: {e}")))?
            .collect();
        let names: Vec<String> = devices
            .iter()
            .map(|d| d.name().unwrap_or_default())
            .collect();

        let chosen = crate::audio::device::choose_input_name(
            &names,
            preferred_device_name,
            default_name.as_deref(),
        )
        .map(str::to_owned);
        let device = match chosen {
            Some(name) => devices
                .into_iter()
                .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
            None => host.default_input_device(),
        }
        .ok_or_else(|| ParleyError::PermissionDenied("no microphone available".into()))?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            echo_cancellation = processing.echo_cancellation,
            noise_suppression = processing.noise_suppression,
            auto_gain_control = processing.auto_gain_control,
            "opening input device (processing requests apply where the OS offers them)"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| ParleyError::PermissionDenied(format!("input config: {e}")))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels.max(1) as usize;
        let running_cb = Arc::clone(&running);
        let mut mix_buf: Vec<f32> = Vec::new();
        let mut push_mono = move |frames: usize, sample_at: &dyn Fn(usize) -> f32| {
            if !running_cb.load(Ordering::Relaxed) {
                return;
            }
            mix_buf.resize(frames, 0.0);
            for (f, slot) in mix_buf.iter_mut().enumerate() {
                let base = f * ch;
                let mut sum = 0f32;
                for c in 0..ch {
                    sum += sample_at(base + c);
                }
                *slot = sum / ch as f32;
            }
            let written = producer.push_slice(&mix_buf);
            if written < mix_buf.len() {
                warn!("ring buffer full: dropped {} frames", mix_buf.len() - written);
            }
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _info| push_mono(data.len() / ch, &|i| data[i]),
                |err| error!("input stream error: {err}"),
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _info| {
                    push_mono(data.len() / ch, &|i| data[i] as f32 / 32768.0)
                },
                |err| error!("input stream error: {err}"),
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _info| {
                    push_mono(data.len() / ch, &|i| (data[i] as f32 - 32768.0) / 32768.0)
                },
                |err| error!("input stream error: {err}"),
                None,
            ),
            fmt => {
                return Err(ParleyError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(map_build_error)?;

        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::DeviceNotAvailable => {
                ParleyError::PermissionDenied("microphone became unavailable".into())
            }
            other => ParleyError::AudioStream(other.to_string()),
        })?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Stub when the `audio-cpal` feature is disabled.
    #[cfg(not(feature = "audio-cpal"))]
    pub fn open(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
        _processing: AudioProcessing,
    ) -> Result<Self> {
        Err(ParleyError::PermissionDenied(
            "compiled without audio-cpal feature".into(),
        ))
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(feature = "audio-cpal")]
fn map_build_error(e: cpal::BuildStreamError) -> ParleyError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            ParleyError::PermissionDenied("microphone not available".into())
        }
        other => ParleyError::AudioStream(other.to_string()),
    }
}

/// Options for [`start_mic_tap`].
#[derive(Debug, Clone)]
pub struct MicTapOptions {
    pub preferred_device: Option<String>,
    pub processing: AudioProcessing,
    pub target_sample_rate: u32,
    pub block_size: usize,
    pub open_timeout: Duration,
}

/// Live microphone tap: an input stream plus the loop that turns it into
/// encoded chunks. Stopping is idempotent.
pub struct MicTapHandle {
    running: Arc<AtomicBool>,
    sink: TapSink,
    diagnostics: Arc<TapDiagnostics>,
    device_sample_rate: u32,
}

impl MicTapHandle {
    /// A tap with no device behind it. Chunks only arrive through
    /// [`Self::sink`], which makes this the seam for hardware-free hosts.
    pub fn detached(sample_rate: u32) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            sink: TapSink::new(),
            diagnostics: Arc::new(TapDiagnostics::default()),
            device_sample_rate: sample_rate,
        }
    }

    pub fn sink(&self) -> &TapSink {
        &self.sink
    }

    pub fn device_sample_rate(&self) -> u32 {
        self.device_sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn diagnostics(&self) -> TapSnapshot {
        self.diagnostics.snapshot()
    }

    /// Stop producing blocks. The tap thread exits and drops the stream.
    pub fn stop(&self) {
        self.sink.unregister();
        if self.running.swap(false, Ordering::SeqCst) {
            info!("microphone tap stop requested");
        }
    }
}

impl Drop for MicTapHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the microphone and start the tap loop on a blocking thread.
///
/// Blocks until the device is confirmed open, fails, or `open_timeout`
/// elapses (treated as `PermissionDenied`).
pub fn start_mic_tap(
    options: MicTapOptions,
    level_tx: broadcast::Sender<AudioLevelEvent>,
) -> Result<MicTapHandle> {
    let (producer, consumer) = create_audio_ring();
    let running = Arc::new(AtomicBool::new(true));
    let sink = TapSink::new();
    let diagnostics = Arc::new(TapDiagnostics::default());

    let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

    let running_thread = Arc::clone(&running);
    let sink_thread = sink.clone();
    let diagnostics_thread = Arc::clone(&diagnostics);
    let open_timeout = options.open_timeout;

    tokio::task::spawn_blocking(move || {
        let capture = match MicCapture::open(
            producer,
            Arc::clone(&running_thread),
            options.preferred_device.as_deref(),
            options.processing,
        ) {
            Ok(c) => {
                let _ = open_tx.send(Ok(c.sample_rate));
                c
            }
            Err(e) => {
                let _ = open_tx.send(Err(e));
                running_thread.store(false, Ordering::SeqCst);
                return;
            }
        };

        tap::run(TapContext {
            consumer,
            running: running_thread,
            sink: sink_thread,
            level_tx,
            device_sample_rate: capture.sample_rate,
            target_sample_rate: options.target_sample_rate,
            block_size: options.block_size,
            diagnostics: diagnostics_thread,
        });

        capture.stop();
        // Stream drops here, releasing the device on this thread.
        drop(capture);
    });

    match open_rx.recv_timeout(open_timeout) {
        Ok(Ok(device_sample_rate)) => {
            info!(device_sample_rate, "microphone tap running");
            Ok(MicTapHandle {
                running,
                sink,
                diagnostics,
                device_sample_rate,
            })
        }
        Ok(Err(e)) => Err(e),
        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
            running.store(false, Ordering::SeqCst);
            Err(ParleyError::PermissionDenied(format!(
                "microphone did not open within {open_timeout:?}"
            )))
        }
        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
            running.store(false, Ordering::SeqCst);
            Err(ParleyError::Other(anyhow::anyhow!(
                "capture thread died unexpectedly"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::chunk::EncodedAudioChunk;
    use tokio::sync::mpsc;

    #[test]
    fn detached_tap_forwards_through_its_sink_until_stopped() {
        let tap = MicTapHandle::detached(16_000);
        let (tx, mut rx) = mpsc::unbounded_channel();
        tap.sink().register(tx);

        assert!(tap.sink().deliver(EncodedAudioChunk::from_pcm(&[1, 0], 16_000)));
        assert!(rx.try_recv().is_ok());

        tap.stop();
        tap.stop();
        assert!(!tap.is_running());
        assert!(!tap.sink().deliver(EncodedAudioChunk::from_pcm(&[1, 0], 16_000)));
    }

    #[test]
    fn default_processing_requests_everything() {
        let p = AudioProcessing::default();
        assert!(p.echo_cancellation && p.noise_suppression && p.auto_gain_control);
    }
}
