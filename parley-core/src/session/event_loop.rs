//! The per-session event loop.
//!
//! One task owns the connection, the playback scheduler, the frame sampler,
//! the recorder and the metrics generator, so none of them need locks. Every
//! input is a branch of one `select!`:
//!
//! ```text
//! capture sink ──► record ──► connection.send
//! connection   ──► scheduler.on_chunk_received ──► output device
//! output device (ended) ──► scheduler.on_slot_ended
//! timers       ──► frame snapshot / metrics / elapsed
//! frame encode (blocking pool) ──► frame sequence
//! stop         ──► drain, close connection, close playback, finalize
//! ```

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    audio::playback::{PlaybackEnded, PlaybackScheduler},
    buffering::chunk::EncodedAudioChunk,
    error::ParleyError,
    ipc::events::{
        format_elapsed, ElapsedEvent, LiveMetricsEvent, SessionStatus, SessionStatusEvent,
    },
    live::{
        connection::{InboundEvent, LiveConnection},
        protocol::{InboundMessage, OutboundMedia},
    },
    media::{
        frames::{FrameSampler, StillFrame},
        recorder::{AudioArtifact, SessionRecorder, WAV_MIME_TYPE},
    },
    metrics::MetricsSource,
};

use super::SessionOutput;

pub(crate) struct LoopTimers {
    pub frame: Duration,
    pub metrics: Duration,
    pub elapsed: Duration,
}

pub(crate) struct EventLoop {
    pub chunks: mpsc::UnboundedReceiver<EncodedAudioChunk>,
    pub connection: LiveConnection,
    pub scheduler: PlaybackScheduler,
    pub ended: mpsc::UnboundedReceiver<PlaybackEnded>,
    pub sampler: FrameSampler,
    pub recorder: SessionRecorder,
    pub metrics: Box<dyn MetricsSource>,
    pub metrics_enabled: bool,
    pub timers: LoopTimers,
    pub status_tx: broadcast::Sender<SessionStatusEvent>,
    pub metrics_tx: broadcast::Sender<LiveMetricsEvent>,
    pub elapsed_tx: broadcast::Sender<ElapsedEvent>,
    pub stop: oneshot::Receiver<()>,
}

#[derive(Default)]
struct LoopStats {
    sent: u64,
    received: u64,
    dropped: u64,
}

impl EventLoop {
    pub(crate) async fn run(mut self) -> SessionOutput {
        let mut frame_tick = ticker(self.timers.frame);
        let mut metrics_tick = ticker(self.timers.metrics);
        let mut elapsed_tick = ticker(self.timers.elapsed);

        // At most one encode in flight keeps frames in capture order.
        let mut encodes: JoinSet<image::ImageResult<StillFrame>> = JoinSet::new();
        let mut stats = LoopStats::default();
        let mut elapsed_secs = 0u64;
        let mut remote_open = true;

        loop {
            tokio::select! {
                biased;

                // Err means the session handle was dropped; same outcome.
                _ = &mut self.stop => break,

                Some(chunk) = self.chunks.recv() => {
                    self.on_outbound(&chunk, &mut stats);
                }

                event = self.connection.recv(), if remote_open => match event {
                    Some(InboundEvent::Message(msg)) => self.on_inbound(msg, &mut stats),
                    Some(InboundEvent::Closed { reason }) => {
                        remote_open = false;
                        self.on_remote_closed(reason);
                    }
                    None => {
                        remote_open = false;
                        self.on_remote_closed("transport ended".into());
                    }
                },

                Some(ended) = self.ended.recv() => {
                    self.scheduler.on_slot_ended(ended);
                }

                _ = frame_tick.tick() => {
                    if !encodes.is_empty() {
                        self.sampler.skip("previous frame still encoding");
                    } else if let Some(pending) = self.sampler.snapshot() {
                        encodes.spawn_blocking(move || pending.encode());
                    }
                }

                Some(done) = encodes.join_next() => {
                    self.on_frame_encoded(done);
                }

                _ = metrics_tick.tick(), if self.metrics_enabled => {
                    let _ = self.metrics_tx.send(self.metrics.next_sample());
                }

                _ = elapsed_tick.tick() => {
                    elapsed_secs += 1;
                    let _ = self.elapsed_tx.send(ElapsedEvent {
                        seconds: elapsed_secs,
                        display: format_elapsed(elapsed_secs),
                    });
                }
            }
        }

        while let Some(done) = encodes.join_next().await {
            self.on_frame_encoded(done);
        }
        self.finish(stats)
    }

    fn on_frame_encoded(&mut self, done: Result<image::ImageResult<StillFrame>, JoinError>) {
        match done {
            Ok(encoded) => {
                self.sampler.complete(encoded);
            }
            Err(e) => self.sampler.skip(&format!("encode task failed: {e}")),
        }
    }

    fn on_outbound(&mut self, chunk: &EncodedAudioChunk, stats: &mut LoopStats) {
        if let Err(e) = self.recorder.record(chunk) {
            warn!("chunk not recorded: {e}");
        }
        if !self.connection.is_open() {
            return;
        }
        match self.connection.send(OutboundMedia::pcm16(chunk)) {
            Ok(()) => stats.sent += 1,
            Err(e) => debug!("outbound chunk not sent: {e}"),
        }
    }

    fn on_inbound(&mut self, msg: InboundMessage, stats: &mut LoopStats) {
        if msg.setup_complete {
            debug!("setup acknowledged again");
        }
        if msg.interrupted {
            info!("agent turn interrupted");
        }
        if msg.turn_complete {
            debug!("agent turn complete");
        }
        if let Some(text) = &msg.transcript {
            debug!(transcript = text.as_str(), "agent said");
        }

        for chunk in &msg.audio {
            match self.scheduler.on_chunk_received(chunk) {
                Ok(slot) => {
                    stats.received += 1;
                    debug!(
                        slot = slot.id,
                        start = slot.start_time,
                        duration = slot.duration,
                        "agent audio scheduled"
                    );
                }
                Err(ParleyError::Decode(e)) => {
                    stats.dropped += 1;
                    warn!("dropping undecodable agent audio: {e}");
                }
                Err(e) => {
                    stats.dropped += 1;
                    warn!("agent audio not scheduled: {e}");
                }
            }
        }
    }

    /// The remote side went away on its own. The session stays `Active` until
    /// the user stops it; nothing more is sent.
    fn on_remote_closed(&mut self, reason: String) {
        warn!(reason = reason.as_str(), "remote side closed the connection");
        self.connection.shutdown_outbound();
        let _ = self.status_tx.send(SessionStatusEvent {
            status: SessionStatus::Active,
            detail: Some(format!("remote closed: {reason}")),
        });
    }

    fn finish(mut self, stats: LoopStats) -> SessionOutput {
        // Blocks captured before the sink was unregistered still belong to
        // the recording, but are no longer sent.
        let mut late = 0usize;
        while let Ok(chunk) = self.chunks.try_recv() {
            if self.recorder.record(&chunk).is_ok() {
                late += 1;
            }
        }

        self.connection.close();
        self.scheduler.close();

        let sample_rate = self.recorder.sample_rate();
        let audio = match self.recorder.stop() {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("failed to finalize recording: {e}");
                AudioArtifact {
                    mime_type: WAV_MIME_TYPE.into(),
                    bytes: Vec::new(),
                    sample_rate,
                    samples: 0,
                }
            }
        };

        info!(
            sent = stats.sent,
            received = stats.received,
            dropped = stats.dropped,
            late,
            frames_skipped = self.sampler.skipped(),
            "session event loop finished"
        );

        SessionOutput {
            audio,
            frames: self.sampler.take_sequence(),
        }
    }
}

/// First tick one `period` from now, not immediately.
fn ticker(period: Duration) -> tokio::time::Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
