//! Duplex session manager.
//!
//! ## Lifecycle
//!
//! ```text
//! DuplexSession::new()
//!     └─► start(scenario)   Idle → Connecting
//!           acquire camera + mic   (bounded: acquire_timeout → PermissionDenied)
//!           open playback graph
//!           connect + setup        (bounded: connect_timeout → Connection)
//!         └─► Active         sink registered, event loop spawned
//!             └─► stop()     Active → Closing → Idle
//!                   1. unregister the capture sink (no new outbound audio)
//!                   2. event loop closes the connection, then the playback graph
//!                   3. capture + camera released
//! ```
//!
//! Any failure while connecting releases whatever was already acquired and
//! returns to `Idle`. So does `stop()` called while connecting; otherwise it
//! is a no-op when nothing is running.
//!
//! ## Ownership
//!
//! All per-session resources live in one [`SessionHandle`], created by
//! `start()` and consumed by `stop()`. The connection and the playback graph
//! are moved into the event loop, which is the only place they are touched.

pub mod devices;
pub mod event_loop;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    audio::{
        capture::{AudioProcessing, MicTapHandle},
        playback::{OutputDevice, PlaybackEnded, PlaybackScheduler, SPEAKING_TOLERANCE_SECS},
    },
    coach::Scenario,
    error::{ParleyError, Result},
    ipc::events::{
        AudioLevelEvent, ElapsedEvent, LiveMetricsEvent, SessionStatus, SessionStatusEvent,
        SpeakingEvent,
    },
    live::{
        connection::LiveConnector,
        persona::build_system_instruction,
        protocol::{LiveSetup, DEFAULT_INBOUND_RATE},
    },
    media::{
        camera::{CameraConfig, CameraFeed},
        frames::{subsample_frames, FrameSampler, FrameSequence, StillFrame},
        recorder::{AudioArtifact, SessionRecorder},
        video::VideoSurface,
    },
    metrics::{idle_metrics, MetricsSource, RandomMetrics},
};

use event_loop::{EventLoop, LoopTimers};

/// Broadcast channel capacity for host-facing events.
const BROADCAST_CAP: usize = 256;

pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Configuration for `DuplexSession`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Outbound (transmission) sample rate in Hz. Default: 16000.
    pub capture_sample_rate: u32,
    /// Playback graph rate in Hz. Default: 24000.
    pub playback_sample_rate: u32,
    /// Samples per outbound block. Default: 4096.
    pub block_size: usize,
    /// Window for deciding the playback queue has drained. Default: 0.1 s.
    pub speaking_tolerance_secs: f64,
    pub frame_interval: Duration,
    /// JPEG quality for sampled frames. Default: 60.
    pub jpeg_quality: u8,
    pub metrics_enabled: bool,
    pub metrics_interval: Duration,
    /// Each tick advances the elapsed display by one second.
    pub elapsed_interval: Duration,
    pub acquire_timeout: Duration,
    pub connect_timeout: Duration,
    /// Language the agent must speak.
    pub language: String,
    /// Live model name.
    pub model: String,
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
    pub processing: AudioProcessing,
    pub camera: CameraConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16_000,
            playback_sample_rate: DEFAULT_INBOUND_RATE,
            block_size: 4_096,
            speaking_tolerance_secs: SPEAKING_TOLERANCE_SECS,
            frame_interval: Duration::from_secs(2),
            jpeg_quality: 60,
            metrics_enabled: true,
            metrics_interval: Duration::from_secs(4),
            elapsed_interval: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
            language: "Arabic".into(),
            model: DEFAULT_LIVE_MODEL.into(),
            preferred_input_device: None,
            preferred_output_device: None,
            processing: AudioProcessing::default(),
            camera: CameraConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend seams
// ---------------------------------------------------------------------------

/// Camera + microphone as acquired for one session.
pub struct MediaHandle {
    pub mic: MicTapHandle,
    pub camera: Option<CameraFeed>,
    pub surface: VideoSurface,
}

impl MediaHandle {
    pub fn new(mic: MicTapHandle, camera: Option<CameraFeed>, surface: VideoSurface) -> Self {
        Self {
            mic,
            camera,
            surface,
        }
    }

    /// Stop the microphone and the camera. Idempotent.
    pub async fn release(&mut self) {
        self.mic.stop();
        if let Some(mut camera) = self.camera.take() {
            camera.stop().await;
        }
        self.surface.clear();
    }
}

/// Acquires camera + microphone.
pub trait CaptureBackend: Send + Sync {
    /// # Errors
    /// `ParleyError::PermissionDenied` when access is refused or no device
    /// exists.
    fn acquire<'a>(
        &'a self,
        config: &'a SessionConfig,
        level_tx: broadcast::Sender<AudioLevelEvent>,
    ) -> BoxFuture<'a, Result<MediaHandle>>;
}

/// Opens the playback graph. May block while the device starts.
pub trait PlaybackBackend: Send + Sync {
    fn open(
        &self,
        config: &SessionConfig,
        ended_tx: mpsc::UnboundedSender<PlaybackEnded>,
    ) -> Result<Box<dyn OutputDevice>>;
}

/// Builds a fresh metrics generator for each session.
pub type MetricsFactory = Arc<dyn Fn() -> Box<dyn MetricsSource> + Send + Sync>;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// What a finished session leaves behind for analysis.
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub audio: AudioArtifact,
    pub frames: FrameSequence,
}

impl SessionOutput {
    /// The frames as handed to the analysis collaborator (at most 10).
    pub fn frames_for_analysis(&self) -> Vec<StillFrame> {
        subsample_frames(self.frames.frames())
    }
}

/// Everything one running session owns. Never reused after `stop()`.
pub struct SessionHandle {
    media: MediaHandle,
    stop_tx: Option<oneshot::Sender<()>>,
    event_loop: JoinHandle<SessionOutput>,
}

/// The top-level session handle.
///
/// `DuplexSession` is `Send + Sync`. Wrap in `Arc` to share with event
/// forwarding tasks.
pub struct DuplexSession {
    config: SessionConfig,
    capture: Arc<dyn CaptureBackend>,
    playback: Arc<dyn PlaybackBackend>,
    connector: Arc<dyn LiveConnector>,
    metrics: MetricsFactory,
    handle: tokio::sync::Mutex<Option<SessionHandle>>,
    /// Present only while `start()` is connecting.
    start_cancel: Mutex<Option<oneshot::Sender<()>>>,
    status: Arc<Mutex<SessionStatus>>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    speaking_tx: broadcast::Sender<SpeakingEvent>,
    level_tx: broadcast::Sender<AudioLevelEvent>,
    metrics_tx: broadcast::Sender<LiveMetricsEvent>,
    elapsed_tx: broadcast::Sender<ElapsedEvent>,
}

impl DuplexSession {
    pub fn new(
        config: SessionConfig,
        capture: Arc<dyn CaptureBackend>,
        playback: Arc<dyn PlaybackBackend>,
        connector: Arc<dyn LiveConnector>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (speaking_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (level_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (metrics_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (elapsed_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            capture,
            playback,
            connector,
            metrics: Arc::new(|| Box::new(RandomMetrics::new()) as Box<dyn MetricsSource>),
            handle: tokio::sync::Mutex::new(None),
            start_cancel: Mutex::new(None),
            status: Arc::new(Mutex::new(SessionStatus::Idle)),
            status_tx,
            speaking_tx,
            level_tx,
            metrics_tx,
            elapsed_tx,
        }
    }

    /// Session on the system camera, microphone and speakers.
    pub fn with_devices(config: SessionConfig, connector: Arc<dyn LiveConnector>) -> Self {
        Self::new(
            config,
            Arc::new(devices::DeviceCapture),
            Arc::new(devices::DevicePlayback),
            connector,
        )
    }

    /// Replace the live metrics generator.
    pub fn with_metrics_source(mut self, factory: MetricsFactory) -> Self {
        self.metrics = factory;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session for `scenario`.
    ///
    /// Returns once the session is `Active`, or after everything acquired on
    /// the way has been released again.
    ///
    /// # Errors
    /// - `ParleyError::AlreadyRunning` if a session is not `Idle`.
    /// - `ParleyError::Cancelled` if `stop()` is called while connecting.
    /// - `ParleyError::PermissionDenied` when media cannot be acquired.
    /// - `ParleyError::AudioDevice` / `AudioStream` when playback cannot open.
    /// - `ParleyError::Connection` when the remote side is unreachable,
    ///   rejects the setup, or does not answer within `connect_timeout`.
    pub async fn start(&self, scenario: &Scenario) -> Result<()> {
        let mut slot = self.handle.lock().await;
        if slot.is_some() || self.status() != SessionStatus::Idle {
            return Err(ParleyError::AlreadyRunning);
        }

        self.set_status(SessionStatus::Connecting, None);
        let mut connecting = ConnectingGuard {
            session: self,
            armed: true,
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *self.start_cancel.lock() = Some(cancel_tx);
        let opened = self.open(scenario, cancel_rx).await;
        self.start_cancel.lock().take();
        connecting.armed = false;

        match opened {
            Ok(handle) => {
                *slot = Some(handle);
                self.set_status(SessionStatus::Active, None);
                info!(title = scenario.title.as_str(), "session active");
                Ok(())
            }
            Err(e) => {
                warn!("session start failed: {e}");
                self.set_status(SessionStatus::Idle, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// `cancel` fires when `stop()` is called before the session is active.
    async fn open(
        &self,
        scenario: &Scenario,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<SessionHandle> {
        let config = &self.config;

        // ── Capture ──────────────────────────────────────────────────────────
        let acquire = tokio::time::timeout(
            config.acquire_timeout,
            self.capture.acquire(config, self.level_tx.clone()),
        );
        let mut media = tokio::select! {
            biased;
            _ = &mut cancel => return Err(ParleyError::Cancelled),
            acquired = acquire => match acquired {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ParleyError::PermissionDenied(format!(
                        "media access not granted within {:?}",
                        config.acquire_timeout
                    )))
                }
            },
        };

        // ── Playback graph ───────────────────────────────────────────────────
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let playback = Arc::clone(&self.playback);
        let playback_config = config.clone();
        let output = match tokio::task::spawn_blocking(move || {
            playback.open(&playback_config, ended_tx)
        })
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                media.release().await;
                return Err(e);
            }
            Err(join) => {
                media.release().await;
                return Err(ParleyError::Other(anyhow::anyhow!(
                    "playback open task failed: {join}"
                )));
            }
        };
        let mut scheduler = PlaybackScheduler::new(
            output,
            config.speaking_tolerance_secs,
            self.speaking_tx.clone(),
        );

        // ── Remote connection ────────────────────────────────────────────────
        let setup = LiveSetup {
            model: config.model.clone(),
            system_instruction: build_system_instruction(scenario, &config.language),
        };
        let connect = tokio::time::timeout(config.connect_timeout, self.connector.connect(setup));
        let connected = tokio::select! {
            biased;
            _ = &mut cancel => Err(ParleyError::Cancelled),
            answered = connect => match answered {
                Ok(result) => result,
                Err(_) => Err(ParleyError::Connection(format!(
                    "no answer within {:?}",
                    config.connect_timeout
                ))),
            },
        };
        let connection = match connected {
            Ok(connection) => connection,
            Err(e) => {
                scheduler.close();
                media.release().await;
                return Err(e);
            }
        };

        // ── Wire up ──────────────────────────────────────────────────────────
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        media.mic.sink().register(chunk_tx);

        let mut recorder = SessionRecorder::new(config.capture_sample_rate);
        recorder.start();

        let (stop_tx, stop_rx) = oneshot::channel();
        let event_loop = EventLoop {
            chunks: chunk_rx,
            connection,
            scheduler,
            ended: ended_rx,
            sampler: FrameSampler::new(media.surface.clone(), config.jpeg_quality),
            recorder,
            metrics: (self.metrics)(),
            metrics_enabled: config.metrics_enabled,
            timers: LoopTimers {
                frame: config.frame_interval,
                metrics: config.metrics_interval,
                elapsed: config.elapsed_interval,
            },
            status_tx: self.status_tx.clone(),
            metrics_tx: self.metrics_tx.clone(),
            elapsed_tx: self.elapsed_tx.clone(),
            stop: stop_rx,
        };

        Ok(SessionHandle {
            media,
            stop_tx: Some(stop_tx),
            event_loop: tokio::spawn(event_loop.run()),
        })
    }

    /// Stop the session and collect its output.
    ///
    /// Returns `None` when no session was running. Never fails: teardown
    /// problems are logged.
    pub async fn stop(&self) -> Option<SessionOutput> {
        // A start still connecting gives up and releases what it holds.
        if let Some(cancel) = self.start_cancel.lock().take() {
            let _ = cancel.send(());
        }

        let mut slot = self.handle.lock().await;
        let mut handle = slot.take()?;

        self.set_status(SessionStatus::Closing, None);

        // Nothing new goes out from here on.
        handle.media.mic.sink().unregister();

        // Connection, then playback graph, then recorder (inside the loop).
        if let Some(stop_tx) = handle.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let output = match (&mut handle.event_loop).await {
            Ok(output) => Some(output),
            Err(e) => {
                error!("session event loop failed: {e}");
                None
            }
        };

        handle.media.release().await;

        self.set_status(SessionStatus::Idle, None);
        let _ = self.metrics_tx.send(idle_metrics());
        info!(
            frames = output.as_ref().map(|o| o.frames.len()).unwrap_or(0),
            audio_secs = output
                .as_ref()
                .map(|o| o.audio.duration_secs())
                .unwrap_or(0.0),
            "session stopped"
        );
        output
    }

    /// Current session status (snapshot).
    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_speaking(&self) -> broadcast::Receiver<SpeakingEvent> {
        self.speaking_tx.subscribe()
    }

    /// Per-block microphone levels.
    pub fn subscribe_levels(&self) -> broadcast::Receiver<AudioLevelEvent> {
        self.level_tx.subscribe()
    }

    pub fn subscribe_metrics(&self) -> broadcast::Receiver<LiveMetricsEvent> {
        self.metrics_tx.subscribe()
    }

    pub fn subscribe_elapsed(&self) -> broadcast::Receiver<ElapsedEvent> {
        self.elapsed_tx.subscribe()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_status: SessionStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(SessionStatusEvent {
            status: new_status,
            detail,
        });
    }
}

/// Puts the status back to `Idle` if `start()` is dropped or unwinds before
/// `open()` settles.
struct ConnectingGuard<'a> {
    session: &'a DuplexSession,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.start_cancel.lock().take();
            self.session
                .set_status(SessionStatus::Idle, Some("start abandoned".into()));
        }
    }
}
