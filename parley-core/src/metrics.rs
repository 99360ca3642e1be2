//! Live Metrics Simulator.
//!
//! Cosmetic, non-authoritative delivery feedback for on-screen display. It
//! reads nothing from the session and nothing it produces reaches the
//! recording or the analysis. Swap it via [`MetricsSource`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ipc::events::{CoachingHint, HintKind, LiveMetricsEvent};

pub const TONES: &[&str] = &["Confident", "Calm", "Enthusiastic", "Balanced", "Persuasive"];

const WARNINGS: &[&str] = &[
    "Try raising your voice a little so you come across more clearly",
    "You're speaking quickly, take a breath and express yourself calmly",
    "Keep eye contact with the other party",
    "Avoid repeating yourself, focus on logical arguments",
    "Listen carefully to what the other party says before replying",
];

const POSITIVES: &[&str] = &[
    "Excellent tone! Keep up this energy",
    "Your reply is logical and very persuasive",
    "Your body language shows strong confidence",
    "Your speaking pace suits the situation",
    "Great engagement with the question",
];

/// A generator of illustrative samples.
pub trait MetricsSource: Send {
    fn next_tone_sample(&mut self) -> String;
    /// Integer percentage.
    fn next_confidence_sample(&mut self) -> u8;
    fn next_pace_sample(&mut self) -> String;
    fn next_hint(&mut self) -> Option<CoachingHint>;

    fn next_sample(&mut self) -> LiveMetricsEvent {
        LiveMetricsEvent {
            tone: self.next_tone_sample(),
            confidence: self.next_confidence_sample(),
            pace: self.next_pace_sample(),
            hint: self.next_hint(),
        }
    }
}

/// What the display shows while nothing is being measured.
pub fn idle_metrics() -> LiveMetricsEvent {
    LiveMetricsEvent {
        tone: "listening".into(),
        confidence: 0,
        pace: "average".into(),
        hint: None,
    }
}

/// Uniformly random samples.
pub struct RandomMetrics {
    rng: StdRng,
}

impl RandomMetrics {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence, for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn pick(&mut self, items: &[&str]) -> String {
        items[self.rng.gen_range(0..items.len())].to_string()
    }
}

impl Default for RandomMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for RandomMetrics {
    fn next_tone_sample(&mut self) -> String {
        self.pick(TONES)
    }

    fn next_confidence_sample(&mut self) -> u8 {
        self.rng.gen_range(70..98)
    }

    fn next_pace_sample(&mut self) -> String {
        pace_label(self.rng.gen::<f64>()).to_string()
    }

    fn next_hint(&mut self) -> Option<CoachingHint> {
        let roll: f64 = self.rng.gen();
        let kind = hint_kind(roll)?;
        let text = match kind {
            HintKind::Warning => self.pick(WARNINGS),
            HintKind::Positive => self.pick(POSITIVES),
        };
        Some(CoachingHint { kind, text })
    }
}

fn pace_label(roll: f64) -> &'static str {
    if roll > 0.8 {
        "slightly fast"
    } else if roll < 0.2 {
        "slow"
    } else {
        "ideal"
    }
}

fn hint_kind(roll: f64) -> Option<HintKind> {
    if roll > 0.75 {
        Some(HintKind::Warning)
    } else if roll > 0.5 {
        Some(HintKind::Positive)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stay_in_range() {
        let mut metrics = RandomMetrics::seeded(7);
        for _ in 0..500 {
            let sample = metrics.next_sample();
            assert!(TONES.contains(&sample.tone.as_str()));
            assert!((70..=97).contains(&sample.confidence));
            assert!(["slow", "ideal", "slightly fast"].contains(&sample.pace.as_str()));
            if let Some(hint) = sample.hint {
                let pool = match hint.kind {
                    HintKind::Warning => WARNINGS,
                    HintKind::Positive => POSITIVES,
                };
                assert!(pool.contains(&hint.text.as_str()));
            }
        }
    }

    #[test]
    fn thresholds() {
        assert_eq!(pace_label(0.1), "slow");
        assert_eq!(pace_label(0.5), "ideal");
        assert_eq!(pace_label(0.81), "slightly fast");
        assert_eq!(hint_kind(0.9), Some(HintKind::Warning));
        assert_eq!(hint_kind(0.6), Some(HintKind::Positive));
        assert_eq!(hint_kind(0.5), None);
    }

    #[test]
    fn seeded_sequences_repeat() {
        let a: Vec<_> = (0..5)
            .scan(RandomMetrics::seeded(42), |m, _| Some(m.next_sample()))
            .collect();
        let b: Vec<_> = (0..5)
            .scan(RandomMetrics::seeded(42), |m, _| Some(m.next_sample()))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn idle_display_resets() {
        let idle = idle_metrics();
        assert_eq!(idle.confidence, 0);
        assert_eq!(idle.tone, "listening");
        assert!(idle.hint.is_none());
    }
}
