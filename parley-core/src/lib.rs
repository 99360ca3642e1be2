//! # parley-core
//!
//! Live voice roleplay session SDK: a duplex audio conversation with a remote
//! agent, with still frames and a recording kept for later analysis.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → MicCapture → SPSC RingBuffer → tap loop(spawn_blocking)
//!                                                  │  resample, 4096-sample blocks
//!                                                  │  PCM16 → base64
//!                                            TapSink (mpsc)
//!                                                  │
//!                                    session event loop (tokio task)
//!                                     │            │             │
//!                              SessionRecorder  LiveConnection  FrameSampler ← VideoSurface ← CameraFeed
//!                                                  │
//!                                         PlaybackScheduler → OutputDevice (cpal thread)
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens in the tap thread
//! and the event loop.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod coach;
pub mod error;
pub mod ipc;
pub mod live;
pub mod media;
pub mod metrics;
pub mod session;

// Convenience re-exports for downstream crates
pub use coach::{AnalysisResult, CoachingBackend, Scenario, UserProfile};
pub use error::{ParleyError, Result};
pub use ipc::events::{
    AudioLevelEvent, ElapsedEvent, LiveMetricsEvent, SessionStatus, SessionStatusEvent,
    SpeakingEvent,
};
pub use live::connection::{LiveConnector, WebSocketConnector};
pub use session::{DuplexSession, SessionConfig, SessionOutput};

#[cfg(feature = "gemini")]
pub use coach::gemini::GeminiCoach;
