//! Persistent host settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parley_core::{
    coach::{gemini::DEFAULT_TEXT_MODEL, UserProfile},
    live::connection::DEFAULT_LIVE_ENDPOINT,
    media::camera::CameraConfig,
    session::DEFAULT_LIVE_MODEL,
    SessionConfig,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub api_key: Option<String>,
    pub language: String,
    pub live_model: String,
    pub live_endpoint: String,
    pub text_model: String,
    pub request_timeout_secs: u64,
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub jpeg_quality: u8,
    pub frame_interval_secs: f32,
    pub live_metrics: bool,
    pub camera: CameraConfig,
    pub profile: UserProfile,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            language: "Arabic".into(),
            live_model: DEFAULT_LIVE_MODEL.into(),
            live_endpoint: DEFAULT_LIVE_ENDPOINT.into(),
            text_model: DEFAULT_TEXT_MODEL.into(),
            request_timeout_secs: 120,
            preferred_input_device: None,
            preferred_output_device: None,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            jpeg_quality: 60,
            frame_interval_secs: 2.0,
            live_metrics: true,
            camera: CameraConfig::default(),
            profile: UserProfile {
                name: "Student".into(),
                major: "Business Administration".into(),
                target_skill: "Negotiation".into(),
            },
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.api_key = normalize_optional(self.api_key.as_deref());
        self.preferred_input_device = normalize_optional(self.preferred_input_device.as_deref());
        self.preferred_output_device =
            normalize_optional(self.preferred_output_device.as_deref());
        self.language = non_empty_or(&self.language, "Arabic");
        self.live_model = non_empty_or(&self.live_model, DEFAULT_LIVE_MODEL);
        self.live_endpoint = non_empty_or(&self.live_endpoint, DEFAULT_LIVE_ENDPOINT);
        self.text_model = non_empty_or(&self.text_model, DEFAULT_TEXT_MODEL);
        self.request_timeout_secs = self.request_timeout_secs.clamp(5, 600);
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        if !self.frame_interval_secs.is_finite() {
            self.frame_interval_secs = 2.0;
        }
        self.frame_interval_secs = self.frame_interval_secs.clamp(0.25, 30.0);
        self.camera.width = self.camera.width.clamp(16, 3840);
        self.camera.height = self.camera.height.clamp(16, 2160);
        self.camera.fps = self.camera.fps.clamp(1, 60);
    }

    /// Environment wins over the file: `PARLEY_API_KEY`, then `GEMINI_API_KEY`.
    pub fn apply_env_overrides(&mut self) {
        let from_env = ["PARLEY_API_KEY", "GEMINI_API_KEY"]
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .and_then(|k| normalize_optional(Some(&k)));
        if from_env.is_some() {
            self.api_key = from_env;
        }
        if let Some(language) = std::env::var("PARLEY_LANGUAGE")
            .ok()
            .and_then(|l| normalize_optional(Some(&l)))
        {
            self.language = language;
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig {
            language: self.language.clone(),
            model: self.live_model.clone(),
            preferred_input_device: self.preferred_input_device.clone(),
            preferred_output_device: self.preferred_output_device.clone(),
            jpeg_quality: self.jpeg_quality,
            frame_interval: Duration::from_secs_f32(self.frame_interval_secs),
            metrics_enabled: self.live_metrics,
            camera: self.camera.clone(),
            ..SessionConfig::default()
        };
        config.processing.echo_cancellation = self.echo_cancellation;
        config.processing.noise_suppression = self.noise_suppression;
        config.processing.auto_gain_control = self.auto_gain_control;
        config
    }
}

fn normalize_optional(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn non_empty_or(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.into()
    } else {
        trimmed.into()
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Parley")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("parley")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.apply_env_overrides();
    settings.normalize();
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"language":"English","jpegQuality":80}"#).unwrap();
        assert_eq!(settings.language, "English");
        assert_eq!(settings.jpeg_quality, 80);
        assert_eq!(settings.live_model, DEFAULT_LIVE_MODEL);
        assert!(settings.echo_cancellation);
    }

    #[test]
    fn normalize_clamps_and_trims() {
        let mut settings = AppSettings {
            api_key: Some("   ".into()),
            language: "  ".into(),
            jpeg_quality: 0,
            frame_interval_secs: f32::NAN,
            preferred_input_device: Some(" USB Mic ".into()),
            ..AppSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.api_key, None);
        assert_eq!(settings.language, "Arabic");
        assert_eq!(settings.jpeg_quality, 1);
        assert_eq!(settings.frame_interval_secs, 2.0);
        assert_eq!(settings.preferred_input_device.as_deref(), Some("USB Mic"));
    }

    #[test]
    fn session_config_carries_host_choices() {
        let settings = AppSettings {
            language: "English".into(),
            noise_suppression: false,
            frame_interval_secs: 1.5,
            ..AppSettings::default()
        };
        let config = settings.session_config();
        assert_eq!(config.language, "English");
        assert!(!config.processing.noise_suppression);
        assert!(config.processing.echo_cancellation);
        assert_eq!(config.frame_interval, Duration::from_millis(1500));
        assert_eq!(config.capture_sample_rate, 16_000);
    }
}
