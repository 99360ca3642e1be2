//! Audio device enumeration and selection.

use serde::{Deserialize, Serialize};

/// Which side of the audio graph a device serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Input,
    Output,
}

/// Metadata about an audio device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    pub direction: DeviceDirection,
    /// Whether this is the system default device for its direction.
    pub is_default: bool,
    /// Heuristic flag for inputs that likely capture system/output audio.
    pub is_loopback_like: bool,
    /// Heuristic recommendation for the best speech microphone.
    /// Always `false` for outputs.
    pub is_recommended: bool,
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "virtual output",
    "monitor of",
    "mix stereo",
    "speakers (",
    "headphones (",
];

const MIC_POSITIVE_KEYWORDS: &[&str] = &[
    "microphone",
    "mic",
    "array",
    "headset",
    "webcam",
    "camera",
    "input",
    "usb",
];

/// Best-effort heuristic for loopback/system-output capture devices.
///
/// Capturing one of these would feed the agent's own voice back to it.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Score a device name for likely speech microphone quality/intent.
///
/// Higher is better.
pub fn mic_preference_score(name: &str) -> i32 {
    let lowered = name.trim().to_ascii_lowercase();
    let mut score = if is_loopback_like_name(&lowered) { -16 } else { 8 };
    if MIC_POSITIVE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 6;
    }
    if lowered.contains("default") {
        score += 1;
    }
    score
}

/// Pick an input name from `candidates`: exact preference match first,
/// then the default (unless it looks like loopback), then the best score.
pub fn choose_input_name<'a>(
    candidates: &'a [String],
    preferred: Option<&str>,
    default_name: Option<&str>,
) -> Option<&'a str> {
    if let Some(preferred) = preferred {
        if let Some(hit) = candidates.iter().find(|c| c.as_str() == preferred) {
            return Some(hit.as_str());
        }
        tracing::warn!(preferred, "preferred input device not found, falling back");
    }
    if let Some(default_name) = default_name {
        if !is_loopback_like_name(default_name) {
            if let Some(hit) = candidates.iter().find(|c| c.as_str() == default_name) {
                return Some(hit.as_str());
            }
        }
    }
    candidates
        .iter()
        .max_by_key(|c| mic_preference_score(c))
        .map(String::as_str)
}

/// List all available audio input devices on the system.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let names: Vec<String> = match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, d)| d.name().unwrap_or_else(|_| format!("Input Device {}", idx + 1)))
            .collect(),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            default_name.iter().cloned().collect()
        }
    };

    let recommended = choose_input_name(&names, None, default_name.as_deref()).map(str::to_owned);
    let mut list: Vec<DeviceInfo> = names
        .iter()
        .map(|name| DeviceInfo {
            name: name.clone(),
            direction: DeviceDirection::Input,
            is_default: default_name.as_deref() == Some(name.as_str()),
            is_loopback_like: is_loopback_like_name(name),
            is_recommended: recommended.as_deref() == Some(name.as_str()),
        })
        .collect();

    list.sort_by_key(|d| {
        (
            !d.is_recommended,
            d.is_loopback_like,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });
    list
}

/// List all available audio output devices on the system.
#[cfg(feature = "audio-cpal")]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    match host.output_devices() {
        Ok(devices) => {
            let mut list: Vec<DeviceInfo> = devices
                .enumerate()
                .map(|(idx, d)| {
                    let name = d
                        .name()
                        .unwrap_or_else(|_| format!("Output Device {}", idx + 1));
                    DeviceInfo {
                        is_default: default_name.as_deref() == Some(name.as_str()),
                        name,
                        direction: DeviceDirection::Output,
                        is_loopback_like: false,
                        is_recommended: false,
                    }
                })
                .collect();
            list.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
            list
        }
        Err(e) => {
            tracing::warn!("failed to enumerate output devices: {e}");
            vec![]
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_output_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_common_loopback_names() {
        assert!(is_loopback_like_name("Stereo Mix (Realtek Audio)"));
        assert!(is_loopback_like_name("Monitor of Built-in Audio Analog Stereo"));
        assert!(!is_loopback_like_name("Built-in Microphone"));
    }

    #[test]
    fn scores_mic_higher_than_loopback() {
        let mic = mic_preference_score("Microphone Array (USB PnP Audio Device)");
        let loopback = mic_preference_score("Stereo Mix (Realtek Audio)");
        assert!(mic > loopback);
    }

    #[test]
    fn choose_input_prefers_exact_match_then_default() {
        let names = vec![
            "Stereo Mix (Realtek Audio)".to_string(),
            "HD Webcam C920".to_string(),
            "Line 1".to_string(),
        ];
        assert_eq!(
            choose_input_name(&names, Some("Line 1"), Some("HD Webcam C920")),
            Some("Line 1")
        );
        assert_eq!(
            choose_input_name(&names, Some("missing"), Some("HD Webcam C920")),
            Some("HD Webcam C920")
        );
    }

    #[test]
    fn choose_input_skips_loopback_default() {
        let names = vec![
            "Stereo Mix (Realtek Audio)".to_string(),
            "Headset Microphone".to_string(),
        ];
        assert_eq!(
            choose_input_name(&names, None, Some("Stereo Mix (Realtek Audio)")),
            Some("Headset Microphone")
        );
        assert_eq!(choose_input_name(&[], None, None), None);
    }
}
