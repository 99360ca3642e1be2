//! Event types a host subscribes to while a session runs.
//!
//! ## Channels
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `SessionStatusEvent` | `DuplexSession::subscribe_status` |
//! | `SpeakingEvent` | `DuplexSession::subscribe_speaking` |
//! | `AudioLevelEvent` | `DuplexSession::subscribe_levels` |
//! | `LiveMetricsEvent` | `DuplexSession::subscribe_metrics` |
//! | `ElapsedEvent` | `DuplexSession::subscribe_elapsed` |
//!
//! All of them serialise as camelCase JSON so a UI shell can forward them as-is.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session status
// ---------------------------------------------------------------------------

/// Emitted whenever the session changes state, or something notable happens
/// while it stays in one (e.g. the remote side hung up).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: SessionStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Lifecycle state of a duplex session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    /// Acquiring media, opening audio graphs and the remote connection.
    Connecting,
    /// Streaming in both directions.
    Active,
    /// Tearing down; returns to `Idle` once every resource is released.
    Closing,
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// Emitted when the agent starts or stops being audible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakingEvent {
    pub is_speaking: bool,
    /// Output clock time of the transition, in seconds.
    pub output_time: f64,
}

/// Emitted once per captured microphone block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioLevelEvent {
    /// Monotonically increasing block sequence number.
    pub seq: u64,
    /// Root-mean-square level of the block in [0.0, 1.0].
    pub rms: f32,
}

// ---------------------------------------------------------------------------
// Live feedback
// ---------------------------------------------------------------------------

/// Illustrative delivery feedback. Never feeds the recording or the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMetricsEvent {
    pub tone: String,
    /// 0 while idle, otherwise in [70, 97].
    pub confidence: u8,
    pub pace: String,
    pub hint: Option<CoachingHint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingHint {
    pub kind: HintKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintKind {
    Warning,
    Positive,
}

/// Session clock, once per second while active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElapsedEvent {
    pub seconds: u64,
    /// `MM:SS`.
    pub display: String,
}

/// Format whole seconds as `MM:SS`. Minutes keep counting past 99.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = SessionStatusEvent {
            status: SessionStatus::Connecting,
            detail: Some("opening live connection".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "connecting");
        assert_eq!(json["detail"], "opening live connection");

        let round_trip: SessionStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, SessionStatus::Connecting);
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        assert!(serde_json::from_str::<SessionStatus>(r#""Active""#).is_err());
    }

    #[test]
    fn speaking_event_uses_camel_case_fields() {
        let json = serde_json::to_value(SpeakingEvent {
            is_speaking: true,
            output_time: 1.5,
        })
        .expect("serialize speaking event");
        assert_eq!(json["isSpeaking"], true);
        assert_eq!(json["outputTime"], 1.5);
    }

    #[test]
    fn metrics_event_omits_nothing_and_tags_hint_kind() {
        let event = LiveMetricsEvent {
            tone: "Calm".into(),
            confidence: 88,
            pace: "ideal".into(),
            hint: Some(CoachingHint {
                kind: HintKind::Warning,
                text: "Slow down slightly".into(),
            }),
        };
        let json = serde_json::to_value(&event).expect("serialize metrics event");
        assert_eq!(json["confidence"], 88);
        assert_eq!(json["hint"]["kind"], "warning");

        let idle = LiveMetricsEvent {
            hint: None,
            ..event
        };
        let json = serde_json::to_value(&idle).expect("serialize idle metrics");
        assert!(json["hint"].is_null());
    }

    #[test]
    fn elapsed_formats_as_minutes_and_seconds() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(59), "00:59");
        assert_eq!(format_elapsed(61), "01:01");
        assert_eq!(format_elapsed(6_000), "100:00");
    }
}
