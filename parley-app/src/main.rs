//! Parley headless host.
//!
//! Runs one live roleplay session on the system camera, microphone and
//! speakers, then sends the recording and the sampled frames for analysis and
//! prints the result as JSON.
//!
//! ```text
//! parley [--scenario <file.json>] [--seconds <n>] [--output <file.json>]
//!        [--save-audio <file.wav>] [--no-analysis] [--settings <file.json>]
//! parley --list-devices
//! ```

mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use parley_core::{
    audio::device::{list_input_devices, list_output_devices},
    CoachingBackend, DuplexSession, GeminiCoach, Scenario, WebSocketConnector,
};
use settings::{default_settings_path, load_settings};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

struct Args {
    scenario: Option<PathBuf>,
    seconds: Option<u64>,
    output: Option<PathBuf>,
    save_audio: Option<PathBuf>,
    settings: Option<PathBuf>,
    no_analysis: bool,
    list_devices: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        scenario: None,
        seconds: None,
        output: None,
        save_audio: None,
        settings: None,
        no_analysis: false,
        list_devices: false,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --scenario".into());
                };
                args.scenario = Some(PathBuf::from(v));
            }
            "--seconds" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --seconds".into());
                };
                let secs = v
                    .parse::<u64>()
                    .map_err(|_| "invalid value for --seconds".to_string())?;
                args.seconds = Some(secs.clamp(1, 3600));
            }
            "--output" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --output".into());
                };
                args.output = Some(PathBuf::from(v));
            }
            "--save-audio" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --save-audio".into());
                };
                args.save_audio = Some(PathBuf::from(v));
            }
            "--settings" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --settings".into());
                };
                args.settings = Some(PathBuf::from(v));
            }
            "--no-analysis" => args.no_analysis = true,
            "--list-devices" => args.list_devices = true,
            "--help" | "-h" => {
                println!(
                    "Usage: parley [--scenario <file.json>] [--seconds <n>] [--output <file.json>] \\
  [--save-audio <file.wav>] [--no-analysis] [--settings <file.json>]
       parley --list-devices"
                );
                std::process::exit(0);
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley=info,parley_core=info")),
        )
        .init();

    let args = parse_args().map_err(anyhow::Error::msg)?;

    if args.list_devices {
        let devices = serde_json::json!({
            "inputs": list_input_devices(),
            "outputs": list_output_devices(),
        });
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    info!(
        settings_path = ?settings_path,
        language = %settings.language,
        live_model = %settings.live_model,
        camera = settings.camera.enabled,
        "Parley starting"
    );

    let Some(api_key) = settings.api_key.clone() else {
        bail!("no API key: set PARLEY_API_KEY or GEMINI_API_KEY, or apiKey in {settings_path:?}");
    };

    let coach = GeminiCoach::new(
        api_key.clone(),
        settings.text_model.clone(),
        settings.language.clone(),
        Duration::from_secs(settings.request_timeout_secs),
    )?;

    let scenario: Scenario = match &args.scenario {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading scenario {path:?}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing scenario {path:?}"))?
        }
        None => {
            info!(
                major = %settings.profile.major,
                skill = %settings.profile.target_skill,
                "generating scenario"
            );
            coach.generate_scenario(&settings.profile).await?
        }
    };
    info!(
        title = %scenario.title,
        counterpart = %scenario.counterpart,
        "scenario ready"
    );

    let connector = Arc::new(WebSocketConnector::new(
        settings.live_endpoint.clone(),
        api_key,
    ));
    let session = Arc::new(DuplexSession::with_devices(
        settings.session_config(),
        connector,
    ));
    spawn_event_logging(&session);

    session.start(&scenario).await?;
    info!("session live; press Ctrl-C to finish");

    match args.seconds {
        Some(secs) => {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "time limit reached");
                }
            }
        }
        None => shutdown_signal().await,
    }

    let Some(output) = session.stop().await else {
        bail!("session produced no output");
    };
    info!(
        audio_secs = output.audio.duration_secs(),
        frames = output.frames.len(),
        "session finished"
    );

    if let Some(path) = &args.save_audio {
        std::fs::write(path, &output.audio.bytes)
            .with_context(|| format!("writing recording {path:?}"))?;
        info!(path = ?path, "recording saved");
    }

    if args.no_analysis {
        return Ok(());
    }

    let analysis = coach
        .analyze_performance(
            &settings.profile,
            &scenario,
            &output.audio,
            output.frames.frames(),
        )
        .await?;
    let json = serde_json::to_string_pretty(&analysis)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("writing {path:?}"))?;
            info!(path = ?path, score = analysis.overall_score, "analysis saved");
        }
        None => println!("{json}"),
    }

    Ok(())
}

/// Mirror session events into the log.
fn spawn_event_logging(session: &DuplexSession) {
    forward(session.subscribe_status(), |e| {
        info!(status = ?e.status, detail = ?e.detail, "session status");
    });
    forward(session.subscribe_speaking(), |e| {
        info!(speaking = e.is_speaking, at = e.output_time, "agent speaking");
    });
    forward(session.subscribe_elapsed(), |e| {
        if e.seconds % 30 == 0 {
            info!(elapsed = %e.display, "session time");
        }
    });
    forward(session.subscribe_metrics(), |e| {
        tracing::debug!(
            tone = %e.tone,
            confidence = e.confidence,
            pace = %e.pace,
            hint = ?e.hint.as_ref().map(|h| h.text.as_str()),
            "live metrics"
        );
    });
}

fn forward<T, F>(mut rx: broadcast::Receiver<T>, mut on_event: F)
where
    T: Clone + Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => on_event(event),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
