//! Gapless playback of inbound agent audio.
//!
//! ## Timeline
//!
//! ```text
//! chunk A arrives ─┐          chunk B arrives (late) ─┐
//!                  ▼                                  ▼
//! output clock ────[======= A =======][======= B =======]──────
//!                  ^ start_A = max(now, next)          ^ next_start_time
//! ```
//!
//! [`PlaybackScheduler`] is the only writer of `next_start_time`. It lives on
//! the session event loop. The audio device only ever sees fully-formed
//! [`PlaybackSlot`]s and reports back which ones finished through
//! [`PlaybackEnded`] messages.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

#[cfg(feature = "audio-cpal")]
use tracing::{error, warn};

use crate::{
    audio::resample::SlotResampler,
    buffering::chunk::{EncodedAudioChunk, PlaybackSlot},
    error::{ParleyError, Result},
    ipc::events::SpeakingEvent,
};

/// Default window within which the output clock counts as having reached
/// the end of the queue.
pub const SPEAKING_TOLERANCE_SECS: f64 = 0.1;

/// Sent by an output device when a slot's last sample has been rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackEnded {
    pub slot_id: u64,
}

/// The output half of the audio graph, as the scheduler sees it.
pub trait OutputDevice: Send {
    /// Output clock in seconds. Monotonic, independent of wall time.
    fn current_time(&self) -> f64;

    /// Queue a slot to begin at `slot.start_time` on the output clock.
    fn schedule(&mut self, slot: PlaybackSlot) -> Result<()>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);
}

/// Where a chunk landed on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSlot {
    pub id: u64,
    pub start_time: f64,
    pub duration: f64,
}

/// Turns inbound chunks into back-to-back slots on the output timeline.
pub struct PlaybackScheduler {
    output: Box<dyn OutputDevice>,
    next_start_time: f64,
    is_speaking: bool,
    tolerance: f64,
    next_slot_id: u64,
    speaking_tx: broadcast::Sender<SpeakingEvent>,
}

impl PlaybackScheduler {
    pub fn new(
        output: Box<dyn OutputDevice>,
        tolerance: f64,
        speaking_tx: broadcast::Sender<SpeakingEvent>,
    ) -> Self {
        Self {
            output,
            next_start_time: 0.0,
            is_speaking: false,
            tolerance: tolerance.max(0.0),
            next_slot_id: 0,
            speaking_tx,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Decode `chunk` and queue it directly behind everything already queued,
    /// or at the current output time if the queue has drained.
    ///
    /// # Errors
    /// `ParleyError::Decode` for a malformed payload; scheduler state is left
    /// untouched so the next chunk is unaffected. Device errors propagate
    /// after the timeline has advanced.
    pub fn on_chunk_received(&mut self, chunk: &EncodedAudioChunk) -> Result<ScheduledSlot> {
        let samples = chunk.decode()?;
        let sample_rate = chunk.sample_rate();
        if sample_rate == 0 {
            return Err(ParleyError::Decode("chunk declares a zero sample rate".into()));
        }

        let now = self.output.current_time();
        let start_time = now.max(self.next_start_time);
        let id = self.next_slot_id;
        self.next_slot_id += 1;

        let slot = PlaybackSlot {
            id,
            start_time,
            samples,
            sample_rate,
        };
        let duration = slot.duration_secs();
        self.next_start_time = start_time + duration;

        debug!(
            slot_id = id,
            start_time,
            duration,
            lag = start_time - now,
            "playback slot scheduled"
        );

        if !self.is_speaking {
            self.set_speaking(true, now);
        }

        self.output.schedule(slot)?;

        Ok(ScheduledSlot {
            id,
            start_time,
            duration,
        })
    }

    /// A slot finished. Speaking ends only once nothing is queued behind it.
    pub fn on_slot_ended(&mut self, ended: PlaybackEnded) {
        let now = self.output.current_time();
        if self.is_speaking && now >= self.next_start_time - self.tolerance {
            debug!(slot_id = ended.slot_id, now, "playback queue drained");
            self.set_speaking(false, now);
        }
    }

    /// Close the output graph. Idempotent.
    pub fn close(&mut self) {
        let now = self.output.current_time();
        self.output.close();
        if self.is_speaking {
            self.set_speaking(false, now);
        }
    }

    fn set_speaking(&mut self, is_speaking: bool, output_time: f64) {
        self.is_speaking = is_speaking;
        let _ = self.speaking_tx.send(SpeakingEvent {
            is_speaking,
            output_time,
        });
    }
}

// ---------------------------------------------------------------------------
// Renderer (runs inside the device callback)
// ---------------------------------------------------------------------------

struct ActiveSlot {
    id: u64,
    start_frame: u64,
    samples: Vec<f32>,
    cursor: usize,
}

/// Mixes queued slots into mono output frames and drives the output clock.
///
/// Slots play strictly one after another. A slot whose start frame has
/// already passed starts immediately. The clock is the count of frames
/// rendered so far.
pub struct Renderer {
    incoming: Receiver<PlaybackSlot>,
    queue: VecDeque<ActiveSlot>,
    frames_rendered: Arc<AtomicU64>,
    frame_rate: u32,
    ended_tx: mpsc::UnboundedSender<PlaybackEnded>,
}

impl Renderer {
    /// `incoming` slots must already be at `frame_rate`.
    pub fn new(
        incoming: Receiver<PlaybackSlot>,
        frames_rendered: Arc<AtomicU64>,
        frame_rate: u32,
        ended_tx: mpsc::UnboundedSender<PlaybackEnded>,
    ) -> Self {
        Self {
            incoming,
            queue: VecDeque::new(),
            frames_rendered,
            frame_rate,
            ended_tx,
        }
    }

    /// Fill `out` with the next `out.len()` mono frames.
    pub fn render(&mut self, out: &mut [f32]) {
        while let Ok(slot) = self.incoming.try_recv() {
            let start_frame = (slot.start_time.max(0.0) * self.frame_rate as f64).round() as u64;
            self.queue.push_back(ActiveSlot {
                id: slot.id,
                start_frame,
                samples: slot.samples,
                cursor: 0,
            });
        }

        let base = self.frames_rendered.load(Ordering::Acquire);
        let mut i = 0;
        while i < out.len() {
            let frame = base + i as u64;
            let Some(active) = self.queue.front_mut() else {
                out[i..].fill(0.0);
                break;
            };

            if active.cursor == 0 && active.start_frame > frame {
                let gap = ((active.start_frame - frame) as usize).min(out.len() - i);
                out[i..i + gap].fill(0.0);
                i += gap;
                continue;
            }

            let n = (active.samples.len() - active.cursor).min(out.len() - i);
            out[i..i + n].copy_from_slice(&active.samples[active.cursor..active.cursor + n]);
            active.cursor += n;
            i += n;

            if active.cursor >= active.samples.len() {
                let slot_id = active.id;
                self.queue.pop_front();
                let _ = self.ended_tx.send(PlaybackEnded { slot_id });
            }
        }

        self.frames_rendered
            .fetch_add(out.len() as u64, Ordering::Release);
    }

    pub fn queued(&self) -> usize {
        self.queue.len() + self.incoming.len()
    }
}

// ---------------------------------------------------------------------------
// Device rate conversion
// ---------------------------------------------------------------------------

/// Slots closer together than this belong to the same run.
const RUN_TOLERANCE_SECS: f64 = 1e-6;

/// Brings slots to the device rate. Back-to-back slots share one
/// [`SlotResampler`] run; a slot that starts after a gap begins a new one.
pub struct DeviceRateConverter {
    device_rate: u32,
    resampler: Option<SlotResampler>,
    /// End of the last slot converted, on the output clock.
    run_end: Option<f64>,
}

impl DeviceRateConverter {
    pub fn new(device_rate: u32) -> Self {
        Self {
            device_rate,
            resampler: None,
            run_end: None,
        }
    }

    /// # Errors
    /// `ParleyError::AudioDevice` if no resampler exists for the slot's rate.
    pub fn convert(&mut self, mut slot: PlaybackSlot) -> Result<PlaybackSlot> {
        let continues_run = self
            .run_end
            .is_some_and(|end| (slot.start_time - end).abs() < RUN_TOLERANCE_SECS);
        self.run_end = Some(slot.end_time());

        if slot.sample_rate == self.device_rate {
            return Ok(slot);
        }

        let mut resampler = match self.resampler.take() {
            Some(mut r) if r.source_rate() == slot.sample_rate => {
                if !continues_run {
                    r.reset();
                }
                r
            }
            _ => SlotResampler::new(slot.sample_rate, self.device_rate)?,
        };
        slot.samples = resampler.convert(&slot.samples);
        slot.sample_rate = self.device_rate;
        self.resampler = Some(resampler);
        Ok(slot)
    }
}

// ---------------------------------------------------------------------------
// cpal output
// ---------------------------------------------------------------------------

/// Output graph on a real device.
///
/// The `cpal::Stream` lives on a dedicated thread that holds it until
/// [`OutputDevice::close`] is called.
pub struct CpalOutput {
    slot_tx: Sender<PlaybackSlot>,
    frames_rendered: Arc<AtomicU64>,
    device_rate: u32,
    converter: DeviceRateConverter,
    close_tx: Option<Sender<()>>,
}

impl CpalOutput {
    /// Open the output device, preferring `target_rate` and falling back to
    /// the device default (slots are then converted before queueing).
    ///
    /// # Errors
    /// `ParleyError::AudioDevice` when no output exists or the stream cannot
    /// be built within `open_timeout`.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        preferred_device_name: Option<&str>,
        target_rate: u32,
        ended_tx: mpsc::UnboundedSender<PlaybackEnded>,
        open_timeout: std::time::Duration,
    ) -> Result<Self> {
        let (slot_tx, slot_rx) = crossbeam_channel::unbounded::<PlaybackSlot>();
        let (close_tx, close_rx) = crossbeam_channel::bounded::<()>(1);
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();
        let frames_rendered = Arc::new(AtomicU64::new(0));

        let preferred = preferred_device_name.map(str::to_owned);
        let clock = Arc::clone(&frames_rendered);

        std::thread::Builder::new()
            .name("parley-playback".into())
            .spawn(move || {
                let stream = match build_output_stream(
                    preferred.as_deref(),
                    target_rate,
                    slot_rx,
                    clock,
                    ended_tx,
                ) {
                    Ok((stream, rate)) => {
                        let _ = open_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                // Blocks until close() or until the handle is dropped.
                let _ = close_rx.recv();
                drop(stream);
                info!("playback stream closed");
            })?;

        let device_rate = match open_rx.recv_timeout(open_timeout) {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let _ = close_tx.send(());
                return Err(ParleyError::AudioDevice(format!(
                    "output device did not open within {open_timeout:?}"
                )));
            }
        };

        info!(device_rate, target_rate, "playback graph open");
        Ok(Self {
            slot_tx,
            frames_rendered,
            device_rate,
            converter: DeviceRateConverter::new(device_rate),
            close_tx: Some(close_tx),
        })
    }

    /// Stub when the `audio-cpal` feature is disabled.
    #[cfg(not(feature = "audio-cpal"))]
    pub fn open(
        _preferred_device_name: Option<&str>,
        _target_rate: u32,
        _ended_tx: mpsc::UnboundedSender<PlaybackEnded>,
        _open_timeout: std::time::Duration,
    ) -> Result<Self> {
        Err(ParleyError::AudioDevice(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.device_rate.max(1) as f64
    }

    fn schedule(&mut self, slot: PlaybackSlot) -> Result<()> {
        if self.close_tx.is_none() {
            return Err(ParleyError::AudioStream("playback graph is closed".into()));
        }
        let slot = self.converter.convert(slot)?;
        self.slot_tx
            .send(slot)
            .map_err(|_| ParleyError::AudioStream("playback thread has exited".into()))
    }

    fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(feature = "audio-cpal")]
fn build_output_stream(
    preferred_device_name: Option<&str>,
    target_rate: u32,
    slot_rx: Receiver<PlaybackSlot>,
    frames_rendered: Arc<AtomicU64>,
    ended_tx: mpsc::UnboundedSender<PlaybackEnded>,
) -> Result<(cpal::Stream, u32)> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, SampleRate, StreamConfig};

    let host = cpal::default_host();
    let mut device = None;
    if let Some(preferred) = preferred_device_name {
        device = host.output_devices().ok().and_then(|mut devices| {
            devices.find(|d| d.name().map(|n| n == preferred).unwrap_or(false))
        });
        if device.is_none() {
            warn!(preferred, "preferred output device not found, falling back");
        }
    }
    let device = device
        .or_else(|| host.default_output_device())
        .ok_or_else(|| ParleyError::AudioDevice("no output device available".into()))?;

    let default = device
        .default_output_config()
        .map_err(|e| ParleyError::AudioDevice(e.to_string()))?;
    let channels = default.channels();
    let format = default.sample_format();

    let supports_target = device
        .supported_output_configs()
        .map(|mut ranges| {
            ranges.any(|r| {
                r.channels() == channels
                    && r.sample_format() == format
                    && r.min_sample_rate().0 <= target_rate
                    && r.max_sample_rate().0 >= target_rate
            })
        })
        .unwrap_or(false);
    let rate = if supports_target {
        target_rate
    } else {
        default.sample_rate().0
    };

    info!(
        device = device.name().unwrap_or_default().as_str(),
        rate,
        channels,
        "opening output device"
    );

    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let ch = channels.max(1) as usize;
    let mut renderer = Renderer::new(slot_rx, frames_rendered, rate, ended_tx);
    let mut mono: Vec<f32> = Vec::new();
    let mut fill = move |frames: usize, write: &mut dyn FnMut(usize, f32)| {
        mono.resize(frames, 0.0);
        renderer.render(&mut mono);
        for (f, &s) in mono.iter().enumerate() {
            for c in 0..ch {
                write(f * ch + c, s);
            }
        }
    };

    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _info| fill(data.len() / ch, &mut |i, s| data[i] = s),
            |err| error!("output stream error: {err}"),
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _info| {
                fill(data.len() / ch, &mut |i, s| {
                    data[i] = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                })
            },
            |err| error!("output stream error: {err}"),
            None,
        ),
        fmt => {
            return Err(ParleyError::AudioDevice(format!(
                "unsupported output sample format: {fmt:?}"
            )))
        }
    }
    .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

    Ok((stream, rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::encode_pcm16;
    use parking_lot::Mutex;

    /// Output whose clock is set by the test.
    #[derive(Clone, Default)]
    struct ManualOutput {
        now: Arc<Mutex<f64>>,
        scheduled: Arc<Mutex<Vec<PlaybackSlot>>>,
        closed: Arc<Mutex<u32>>,
    }

    impl OutputDevice for ManualOutput {
        fn current_time(&self) -> f64 {
            *self.now.lock()
        }
        fn schedule(&mut self, slot: PlaybackSlot) -> Result<()> {
            self.scheduled.lock().push(slot);
            Ok(())
        }
        fn close(&mut self) {
            *self.closed.lock() += 1;
        }
    }

    fn chunk_of(secs: f64) -> EncodedAudioChunk {
        let n = (secs * 24_000.0).round() as usize;
        EncodedAudioChunk::from_pcm(&encode_pcm16(&vec![0.2; n]), 24_000)
    }

    fn scheduler(out: &ManualOutput) -> (PlaybackScheduler, broadcast::Receiver<SpeakingEvent>) {
        let (tx, rx) = broadcast::channel(32);
        (
            PlaybackScheduler::new(Box::new(out.clone()), SPEAKING_TOLERANCE_SECS, tx),
            rx,
        )
    }

    #[test]
    fn burst_arrival_plays_back_to_back() {
        let out = ManualOutput::default();
        *out.now.lock() = 2.0;
        let (mut sched, _rx) = scheduler(&out);

        let durations = [0.5, 0.25, 1.0, 0.125];
        let slots: Vec<ScheduledSlot> = durations
            .iter()
            .map(|d| sched.on_chunk_received(&chunk_of(*d)).unwrap())
            .collect();

        approx::assert_abs_diff_eq!(slots[0].start_time, 2.0);
        for w in slots.windows(2) {
            approx::assert_abs_diff_eq!(w[1].start_time, w[0].start_time + w[0].duration);
        }
        approx::assert_abs_diff_eq!(sched.next_start_time(), 3.875, epsilon = 1e-9);
        assert_eq!(out.scheduled.lock().len(), 4);
    }

    #[test]
    fn jittered_arrival_never_overlaps_and_restarts_after_idle() {
        let out = ManualOutput::default();
        let (mut sched, _rx) = scheduler(&out);

        let a = sched.on_chunk_received(&chunk_of(1.0)).unwrap();
        *out.now.lock() = 0.4; // B arrives while A still plays
        let b = sched.on_chunk_received(&chunk_of(1.0)).unwrap();
        *out.now.lock() = 10.0; // C arrives after a long silence
        let c = sched.on_chunk_received(&chunk_of(0.5)).unwrap();

        approx::assert_abs_diff_eq!(a.start_time, 0.0);
        approx::assert_abs_diff_eq!(b.start_time, 1.0);
        approx::assert_abs_diff_eq!(c.start_time, 10.0);
        assert!(c.start_time >= b.start_time + b.duration);
    }

    #[test]
    fn speaking_clears_only_when_queue_drains() {
        let out = ManualOutput::default();
        let (mut sched, mut rx) = scheduler(&out);

        let a = sched.on_chunk_received(&chunk_of(0.5)).unwrap();
        let b = sched.on_chunk_received(&chunk_of(0.5)).unwrap();
        assert!(sched.is_speaking());
        assert!(rx.try_recv().unwrap().is_speaking);

        *out.now.lock() = 0.5;
        sched.on_slot_ended(PlaybackEnded { slot_id: a.id });
        assert!(sched.is_speaking(), "B is still queued");

        *out.now.lock() = 0.95; // within tolerance of next_start_time = 1.0
        sched.on_slot_ended(PlaybackEnded { slot_id: b.id });
        assert!(!sched.is_speaking());
        assert!(!rx.try_recv().unwrap().is_speaking);
    }

    #[test]
    fn malformed_chunk_leaves_timeline_untouched() {
        let out = ManualOutput::default();
        let (mut sched, _rx) = scheduler(&out);
        sched.on_chunk_received(&chunk_of(0.5)).unwrap();

        let err = sched
            .on_chunk_received(&EncodedAudioChunk::new("%%%", 24_000))
            .unwrap_err();
        assert!(matches!(err, ParleyError::Decode(_)));
        approx::assert_abs_diff_eq!(sched.next_start_time(), 0.5);
        assert_eq!(out.scheduled.lock().len(), 1);
    }

    #[test]
    fn close_is_idempotent_and_stops_speaking() {
        let out = ManualOutput::default();
        let (mut sched, _rx) = scheduler(&out);
        sched.on_chunk_received(&chunk_of(0.5)).unwrap();
        sched.close();
        sched.close();
        assert!(!sched.is_speaking());
        assert_eq!(*out.closed.lock(), 2);
    }

    #[test]
    fn renderer_plays_slots_contiguously_and_reports_endings() {
        let (slot_tx, slot_rx) = crossbeam_channel::unbounded();
        let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
        let clock = Arc::new(AtomicU64::new(0));
        let mut renderer = Renderer::new(slot_rx, Arc::clone(&clock), 10, ended_tx);

        slot_tx
            .send(PlaybackSlot {
                id: 0,
                start_time: 0.2,
                samples: vec![1.0; 3],
                sample_rate: 10,
            })
            .unwrap();
        slot_tx
            .send(PlaybackSlot {
                id: 1,
                start_time: 0.5,
                samples: vec![0.5; 2],
                sample_rate: 10,
            })
            .unwrap();

        let mut out = vec![9.0f32; 10];
        renderer.render(&mut out);
        assert_eq!(
            out,
            vec![0.0, 0.0, 1.0, 1.0, 1.0, 0.5, 0.5, 0.0, 0.0, 0.0]
        );
        assert_eq!(clock.load(Ordering::Acquire), 10);
        assert_eq!(ended_rx.try_recv().unwrap().slot_id, 0);
        assert_eq!(ended_rx.try_recv().unwrap().slot_id, 1);
        assert_eq!(renderer.queued(), 0);
    }

    #[test]
    fn renderer_starts_late_slots_immediately() {
        let (slot_tx, slot_rx) = crossbeam_channel::unbounded();
        let (ended_tx, _ended_rx) = mpsc::unbounded_channel();
        let clock = Arc::new(AtomicU64::new(100));
        let mut renderer = Renderer::new(slot_rx, clock, 10, ended_tx);

        slot_tx
            .send(PlaybackSlot {
                id: 7,
                start_time: 1.0, // frame 10, long gone
                samples: vec![0.25; 2],
                sample_rate: 10,
            })
            .unwrap();
        let mut out = vec![0.0f32; 4];
        renderer.render(&mut out);
        assert_eq!(out, vec![0.25, 0.25, 0.0, 0.0]);
    }

    fn slot_at(id: u64, start_time: f64, n: usize) -> PlaybackSlot {
        PlaybackSlot {
            id,
            start_time,
            samples: vec![0.5; n],
            sample_rate: 24_000,
        }
    }

    #[test]
    fn back_to_back_slots_convert_without_a_seam() {
        let mut conv = DeviceRateConverter::new(48_000);
        let a = conv.convert(slot_at(0, 1.0, 960)).unwrap();
        let b = conv.convert(slot_at(1, end_of(1.0, 960), 960)).unwrap();
        assert_eq!((a.samples.len(), b.samples.len()), (1_920, 1_920));
        assert_eq!(b.sample_rate, 48_000);

        // The tail of `a` and all of `b` are the steady signal.
        for s in a.samples[1_700..].iter().chain(&b.samples) {
            assert!((s - 0.5).abs() < 1e-3, "seam sample {s}");
        }
    }

    #[test]
    fn slot_after_a_gap_starts_a_fresh_run() {
        let mut conv = DeviceRateConverter::new(48_000);
        let _ = conv.convert(slot_at(0, 1.0, 960)).unwrap();
        let late = conv.convert(slot_at(1, 5.0, 960)).unwrap();
        assert_eq!(late.samples.len(), 1_920);
        assert_eq!(late.samples[0], 0.0);
        assert!((late.samples[1_919] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn device_rate_slots_are_untouched() {
        let mut conv = DeviceRateConverter::new(24_000);
        let slot = conv.convert(slot_at(3, 0.0, 480)).unwrap();
        assert_eq!(slot.samples, vec![0.5; 480]);
        assert_eq!(slot.id, 3);
    }

    fn end_of(start: f64, n: usize) -> f64 {
        start + n as f64 / 24_000.0
    }
}
