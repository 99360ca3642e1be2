//! Sample-rate conversion on both sides of the audio graph.
//!
//! Capture: the microphone runs at whatever the device offers (44.1/48 kHz
//! are typical) and the live endpoint takes 16 kHz mono. [`RateConverter`]
//! streams that conversion on the tap thread and keeps partial input between
//! calls. Equal rates skip rubato entirely.
//!
//! Playback: agent audio arrives at 24 kHz. An output device that will not
//! open at 24 kHz gets its slots through a [`SlotResampler`], which treats
//! back-to-back slots as one continuous signal.

use std::collections::VecDeque;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{ParleyError, Result};

/// Streaming mono converter between two fixed rates.
pub struct RateConverter {
    /// `None` for equal rates.
    resampler: Option<FastFixedIn<f32>>,
    frames_per_call: usize,
    /// Input not yet fed to rubato.
    pending: Vec<f32>,
    /// Reused rubato output, one channel.
    scratch: Vec<Vec<f32>>,
}

impl RateConverter {
    /// `frames_per_call` is the input frame count rubato processes at once.
    ///
    /// # Errors
    /// `ParleyError::AudioDevice` if rubato rejects the ratio or chunk size.
    pub fn new(source_rate: u32, target_rate: u32, frames_per_call: usize) -> Result<Self> {
        let (resampler, scratch) = if source_rate == target_rate {
            (None, Vec::new())
        } else {
            let resampler = build_resampler(source_rate, target_rate, frames_per_call)?;
            let scratch = vec![vec![0f32; resampler.output_frames_max()]];
            info!(source_rate, target_rate, frames_per_call, "capture resampling enabled");
            (Some(resampler), scratch)
        };

        Ok(Self {
            resampler,
            frames_per_call,
            pending: Vec::with_capacity(frames_per_call * 2),
            scratch,
        })
    }

    /// Feed `samples`; returns whatever output is ready (possibly nothing).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= self.frames_per_call {
            let input = &self.pending[consumed..consumed + self.frames_per_call];
            match resampler.process_into_buffer(&[input], &mut self.scratch, None) {
                Ok((_, produced)) => out.extend_from_slice(&self.scratch[0][..produced]),
                Err(e) => error!("capture resample failed: {e}"),
            }
            consumed += self.frames_per_call;
        }
        self.pending.drain(..consumed);
        out
    }

    /// Input samples held back until the next full call.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Input frames per rubato call on the playback side (5 ms at 24 kHz).
const SLOT_FRAMES_PER_CALL: usize = 120;

/// Streaming converter for a run of back-to-back playback slots.
///
/// Filter state carries from one slot to the next, so a run converts as one
/// signal. Each slot still comes out at exactly its share of
/// `round(total_in * target / source)` samples: the output starts with a
/// fixed lead of silence that covers the input rubato is still holding.
/// [`reset`](Self::reset) begins a new run.
pub struct SlotResampler {
    /// `None` for equal rates.
    resampler: Option<FastFixedIn<f32>>,
    source_rate: u32,
    target_rate: u32,
    pending: Vec<f32>,
    scratch: Vec<Vec<f32>>,
    ready: VecDeque<f32>,
    lead: usize,
    /// Input frames taken since the last reset.
    consumed: u64,
    /// Output frames handed out since the last reset.
    emitted: u64,
}

impl SlotResampler {
    /// # Errors
    /// `ParleyError::AudioDevice` if rubato rejects the ratio.
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        let (resampler, scratch, lead) = if source_rate == target_rate {
            (None, Vec::new(), 0)
        } else {
            let resampler = build_resampler(source_rate, target_rate, SLOT_FRAMES_PER_CALL)?;
            let scratch = vec![vec![0f32; resampler.output_frames_max()]];
            let lead = (SLOT_FRAMES_PER_CALL as f64 * target_rate as f64 / source_rate as f64)
                .ceil() as usize
                + 2;
            info!(source_rate, target_rate, lead, "playback resampling enabled");
            (Some(resampler), scratch, lead)
        };

        let mut converter = Self {
            resampler,
            source_rate,
            target_rate,
            pending: Vec::with_capacity(SLOT_FRAMES_PER_CALL),
            scratch,
            ready: VecDeque::new(),
            lead,
            consumed: 0,
            emitted: 0,
        };
        converter.reset();
        Ok(converter)
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Output frames of silence at the start of every run.
    pub fn lead(&self) -> usize {
        self.lead
    }

    /// Drop filter state and held input; the next slot starts a new run.
    pub fn reset(&mut self) {
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
        self.pending.clear();
        self.ready.clear();
        self.ready.extend(std::iter::repeat(0.0).take(self.lead));
        self.consumed = 0;
        self.emitted = 0;
    }

    /// Convert the next slot of the current run.
    pub fn convert(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };
        self.pending.extend_from_slice(samples);

        let mut offset = 0;
        while self.pending.len() - offset >= SLOT_FRAMES_PER_CALL {
            let input = &self.pending[offset..offset + SLOT_FRAMES_PER_CALL];
            match resampler.process_into_buffer(&[input], &mut self.scratch, None) {
                Ok((_, produced)) => self.ready.extend(&self.scratch[0][..produced]),
                Err(e) => error!("playback resample failed: {e}"),
            }
            offset += SLOT_FRAMES_PER_CALL;
        }
        self.pending.drain(..offset);

        self.consumed += samples.len() as u64;
        let due = (self.consumed as f64 * self.target_rate as f64 / self.source_rate as f64)
            .round() as u64;
        let take = due.saturating_sub(self.emitted) as usize;
        self.emitted += take as u64;

        let available = take.min(self.ready.len());
        let mut out: Vec<f32> = self.ready.drain(..available).collect();
        // Only short if rubato fell behind the lead.
        let pad = out.last().copied().unwrap_or(0.0);
        out.resize(take, pad);
        out
    }
}

fn build_resampler(
    source_rate: u32,
    target_rate: u32,
    frames_per_call: usize,
) -> Result<FastFixedIn<f32>> {
    FastFixedIn::<f32>::new(
        target_rate as f64 / source_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        frames_per_call,
        1,
    )
    .map_err(|e| ParleyError::AudioDevice(format!("resampler init: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn equal_rates_pass_straight_through() {
        let mut rc = RateConverter::new(16_000, 16_000, 1024).unwrap();
        assert!(rc.is_passthrough());
        let ramp: Vec<f32> = (0..300).map(|i| i as f32 / 300.0).collect();
        assert_eq!(rc.process(&ramp), ramp);
        assert_eq!(rc.pending_len(), 0);
    }

    #[test]
    fn device_rate_down_to_transmission_rate() {
        let mut rc = RateConverter::new(48_000, 16_000, 1024).unwrap();
        assert!(!rc.is_passthrough());
        // Three calls' worth of input plus a remainder.
        let out = rc.process(&vec![0.1f32; 3 * 1024 + 100]);
        assert_eq!(rc.pending_len(), 100);
        let expected = 3 * 1024 / 3;
        assert!(
            (out.len() as isize - expected as isize).unsigned_abs() <= 12,
            "got {} samples, expected about {expected}",
            out.len()
        );
    }

    #[test]
    fn short_input_is_held_until_a_full_call() {
        let mut rc = RateConverter::new(44_100, 16_000, 1024).unwrap();
        assert!(rc.process(&vec![0.0f32; 600]).is_empty());
        assert_eq!(rc.pending_len(), 600);
        assert!(!rc.process(&vec![0.0f32; 600]).is_empty());
        assert_eq!(rc.pending_len(), 176);
    }

    #[test]
    fn contiguous_slots_stay_continuous_across_the_boundary() {
        let mut rc = SlotResampler::new(24_000, 48_000).unwrap();
        let first = rc.convert(&[0.5f32; 960]);
        let second = rc.convert(&[0.5f32; 960]);
        assert_eq!(first.len(), 1_920);
        assert_eq!(second.len(), 1_920);

        // Past the lead and the filter warm-up, the joined run is flat.
        let joined: Vec<f32> = first.iter().chain(&second).copied().collect();
        let settled = rc.lead() + 64;
        for s in &joined[settled..] {
            assert_abs_diff_eq!(*s, 0.5, epsilon = 1e-3);
        }
    }

    #[test]
    fn slot_lengths_track_the_cumulative_ratio() {
        let mut rc = SlotResampler::new(24_000, 44_100).unwrap();
        let total: usize = (0..3).map(|_| rc.convert(&[0.1f32; 1_001]).len()).sum();
        // round(3003 * 44100 / 24000)
        assert_eq!(total, 5_518);
        assert_eq!(rc.convert(&[0.1f32; 2_400]).len(), 4_410);
    }

    #[test]
    fn reset_starts_a_new_run_with_the_lead() {
        let mut rc = SlotResampler::new(24_000, 48_000).unwrap();
        let _ = rc.convert(&[0.5f32; 960]);
        rc.reset();
        let out = rc.convert(&[0.5f32; 960]);
        assert_eq!(out.len(), 1_920);
        assert!(out[..rc.lead()].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn equal_rate_slots_pass_through() {
        let mut rc = SlotResampler::new(24_000, 24_000).unwrap();
        assert_eq!(rc.lead(), 0);
        let slot: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        assert_eq!(rc.convert(&slot), slot);
    }
}
