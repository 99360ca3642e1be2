//! Blocking audio tap loop.
//!
//! ## Stages (per iteration)
//!
//! ```text
//! 1. Drain ring buffer → Vec<f32> at the device rate
//! 2. Resample to the transmission rate (16 kHz)
//! 3. Cut into fixed, non-overlapping blocks (4096 samples)
//! 4. Per block: publish an AudioLevelEvent, encode PCM16 → transport text
//! 5. Deliver the chunk to the registered sink, or drop it when none is set
//! ```
//!
//! Runs in `spawn_blocking` next to the input stream it drains. Delivery never
//! blocks: the sink is an unbounded channel and an absent sink drops the block.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::{
    audio::resample::RateConverter,
    buffering::{
        chunk::{AudioBlock, EncodedAudioChunk},
        AudioConsumer, Consumer,
    },
    ipc::events::AudioLevelEvent,
};

/// Samples drained from the ring buffer per iteration (20 ms at 48 kHz).
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY_MS: u64 = 5;

/// Destination for encoded capture chunks.
///
/// Cloning shares the same slot. The session registers its outbound channel
/// here when it becomes active and unregisters it first thing on teardown.
#[derive(Clone, Default)]
pub struct TapSink {
    slot: Arc<Mutex<Option<mpsc::UnboundedSender<EncodedAudioChunk>>>>,
}

impl TapSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tx: mpsc::UnboundedSender<EncodedAudioChunk>) {
        *self.slot.lock() = Some(tx);
    }

    pub fn unregister(&self) {
        self.slot.lock().take();
    }

    pub fn is_registered(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Hand a chunk to the sink. Returns `false` when it was dropped.
    pub fn deliver(&self, chunk: EncodedAudioChunk) -> bool {
        let guard = self.slot.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(chunk).is_ok(),
            None => false,
        }
    }
}

/// Cuts a continuous sample stream into fixed-size blocks.
#[derive(Debug)]
pub struct BlockAssembler {
    block_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl BlockAssembler {
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        Self {
            block_size: block_size.max(1),
            sample_rate,
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    /// Append samples, returning every block that is now complete.
    /// The remainder waits for the next call.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioBlock> {
        self.pending.extend_from_slice(samples);
        let mut blocks = Vec::new();
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            let full = std::mem::replace(&mut self.pending, rest);
            blocks.push(AudioBlock::new(full, self.sample_rate));
        }
        blocks
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Default)]
pub struct TapDiagnostics {
    pub frames_in: AtomicUsize,
    pub blocks_emitted: AtomicUsize,
    pub blocks_dropped: AtomicUsize,
}

impl TapDiagnostics {
    pub fn snapshot(&self) -> TapSnapshot {
        TapSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            blocks_emitted: self.blocks_emitted.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TapSnapshot {
    pub frames_in: usize,
    pub blocks_emitted: usize,
    pub blocks_dropped: usize,
}

/// Everything the tap loop needs, passed as one struct so the closure stays tidy.
pub struct TapContext {
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub sink: TapSink,
    pub level_tx: broadcast::Sender<AudioLevelEvent>,
    pub device_sample_rate: u32,
    pub target_sample_rate: u32,
    pub block_size: usize,
    pub diagnostics: Arc<TapDiagnostics>,
}

/// Run the blocking tap loop until `ctx.running` becomes false.
pub fn run(mut ctx: TapContext) {
    info!(
        device_rate = ctx.device_sample_rate,
        target_rate = ctx.target_sample_rate,
        block_size = ctx.block_size,
        "audio tap started"
    );

    let mut resampler =
        match RateConverter::new(ctx.device_sample_rate, ctx.target_sample_rate, DRAIN_CHUNK) {
            Ok(r) => r,
            Err(e) => {
                error!("failed to create capture resampler: {e}");
                return;
            }
        };

    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut assembler = BlockAssembler::new(ctx.block_size, ctx.target_sample_rate);
    let mut level_seq = 0u64;

    while ctx.running.load(Ordering::Relaxed) {
        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }
        ctx.diagnostics.frames_in.fetch_add(n, Ordering::Relaxed);

        let resampled = resampler.process(&raw[..n]);
        if resampled.is_empty() {
            continue;
        }

        for block in assembler.push(&resampled) {
            emit_block(&ctx, &block, level_seq);
            level_seq = level_seq.wrapping_add(1);
        }
    }

    let snapshot = ctx.diagnostics.snapshot();
    info!(
        frames_in = snapshot.frames_in,
        blocks_emitted = snapshot.blocks_emitted,
        blocks_dropped = snapshot.blocks_dropped,
        discarded_tail = assembler.pending_len(),
        "audio tap stopped"
    );
}

fn emit_block(ctx: &TapContext, block: &AudioBlock, seq: u64) {
    let _ = ctx.level_tx.send(AudioLevelEvent {
        seq,
        rms: block.rms(),
    });

    if !ctx.sink.is_registered() {
        ctx.diagnostics.blocks_dropped.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let chunk = block.encode();
    if ctx.sink.deliver(chunk) {
        ctx.diagnostics.blocks_emitted.fetch_add(1, Ordering::Relaxed);
    } else {
        ctx.diagnostics.blocks_dropped.fetch_add(1, Ordering::Relaxed);
        debug!(seq, "capture block dropped: sink closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{create_audio_ring, Producer};
    use std::thread;

    #[test]
    fn assembler_emits_fixed_blocks_and_keeps_remainder() {
        let mut asm = BlockAssembler::new(4, 16_000);
        assert!(asm.push(&[0.1, 0.2, 0.3]).is_empty());
        let blocks = asm.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].samples, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(blocks[1].samples, vec![0.5, 0.6, 0.7, 0.8]);
        assert_eq!(asm.pending_len(), 1);
    }

    #[test]
    fn sink_drops_when_nothing_registered() {
        let sink = TapSink::new();
        let chunk = EncodedAudioChunk::from_pcm(&[0, 0], 16_000);
        assert!(!sink.deliver(chunk.clone()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        sink.register(tx);
        assert!(sink.deliver(chunk.clone()));
        assert_eq!(rx.try_recv().expect("chunk delivered"), chunk);

        sink.unregister();
        assert!(!sink.is_registered());
        assert!(!sink.deliver(chunk));
    }

    #[test]
    fn tap_loop_delivers_blocks_in_production_order() {
        let (mut producer, consumer) = create_audio_ring();
        // Three distinct constant blocks of 64 samples each.
        for level in [0.1f32, 0.2, 0.3] {
            producer.push_slice(&vec![level; 64]);
        }

        let running = Arc::new(AtomicBool::new(true));
        let sink = TapSink::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sink.register(tx);
        let (level_tx, mut level_rx) = broadcast::channel(16);
        let diagnostics = Arc::new(TapDiagnostics::default());

        let ctx = TapContext {
            consumer,
            running: Arc::clone(&running),
            sink,
            level_tx,
            device_sample_rate: 16_000,
            target_sample_rate: 16_000,
            block_size: 64,
            diagnostics: Arc::clone(&diagnostics),
        };
        let handle = thread::spawn(move || run(ctx));

        let mut received = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while received.len() < 3 && std::time::Instant::now() < deadline {
            match rx.try_recv() {
                Ok(chunk) => received.push(chunk),
                Err(_) => thread::sleep(Duration::from_millis(2)),
            }
        }
        running.store(false, Ordering::SeqCst);
        handle.join().expect("tap thread panicked");

        assert_eq!(received.len(), 3);
        for (chunk, level) in received.iter().zip([0.1f32, 0.2, 0.3]) {
            let samples = chunk.decode().expect("decode");
            assert_eq!(samples.len(), 64);
            approx::assert_abs_diff_eq!(samples[0], level, epsilon = 1.0 / 32768.0);
        }
        assert_eq!(diagnostics.snapshot().blocks_emitted, 3);
        assert_eq!(level_rx.try_recv().expect("level event").seq, 0);
    }
}
