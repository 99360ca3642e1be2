use thiserror::Error;

/// All errors produced by parley-core.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Camera or microphone access refused, or no such device exists.
    /// Terminal for the session; the caller may retry manually.
    #[error("media permission denied: {0}")]
    PermissionDenied(String),

    /// Remote duplex endpoint unreachable, timed out, or rejected the setup.
    #[error("live connection error: {0}")]
    Connection(String),

    /// Malformed inbound audio payload. Only the offending message is dropped.
    #[error("audio decode error: {0}")]
    Decode(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("camera error: {0}")]
    Camera(String),

    #[error("recorder error: {0}")]
    Recorder(String),

    #[error("collaborator request failed: {0}")]
    Collaborator(String),

    #[error("session is already running")]
    AlreadyRunning,

    /// `stop()` was called before the session became active.
    #[error("session start cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;
