//! `generateContent` REST client for scenario generation and analysis.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{
    analysis_prompt, scenario_prompt, AnalysisResult, CoachingBackend, Scenario, UserProfile,
};
use crate::audio::pcm::to_transport;
use crate::error::{ParleyError, Result};
use crate::media::frames::{subsample_frames, StillFrame};
use crate::media::recorder::AudioArtifact;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

pub struct GeminiCoach {
    client: reqwest::Client,
    api_key: String,
    model: String,
    language: String,
}

impl GeminiCoach {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ParleyError::Collaborator(format!("client build: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            language: language.into(),
        })
    }

    async fn generate<T: DeserializeOwned>(&self, body: Value) -> Result<T> {
        let url = format!("{API_BASE}/models/{}:generateContent", self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ParleyError::Collaborator(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "generateContent returned non-success status");
            return Err(ParleyError::Collaborator(format!(
                "generateContent {status}: {}",
                detail.chars().take(300).collect::<String>()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ParleyError::Collaborator(format!("response body: {e}")))?;
        let text = response_text(&payload)?;
        serde_json::from_str(text)
            .map_err(|e| ParleyError::Collaborator(format!("response JSON: {e}")))
    }
}

impl CoachingBackend for GeminiCoach {
    fn generate_scenario<'a>(&'a self, profile: &'a UserProfile) -> BoxFuture<'a, Result<Scenario>> {
        Box::pin(async move {
            let body = scenario_request(profile, &self.language);
            let scenario: Scenario = self.generate(body).await?;
            info!(title = scenario.title.as_str(), "scenario generated");
            Ok(scenario)
        })
    }

    fn analyze_performance<'a>(
        &'a self,
        profile: &'a UserProfile,
        scenario: &'a Scenario,
        audio: &'a AudioArtifact,
        frames: &'a [StillFrame],
    ) -> BoxFuture<'a, Result<AnalysisResult>> {
        Box::pin(async move {
            let body = analysis_request(profile, scenario, audio, frames, &self.language);
            let result: AnalysisResult = self.generate(body).await?;
            info!(overall_score = result.overall_score, "analysis received");
            Ok(result)
        })
    }
}

fn response_text(payload: &Value) -> Result<&str> {
    payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ParleyError::Collaborator("response carried no text".into()))
}

fn scenario_request(profile: &UserProfile, language: &str) -> Value {
    json!({
        "systemInstruction": { "parts": [{
            "text": "You are a professional corporate trainer. Output strictly in JSON format. Keep descriptions concise."
        }]},
        "contents": [{ "parts": [{ "text": scenario_prompt(profile, language) }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": scenario_schema(),
        }
    })
}

fn analysis_request(
    profile: &UserProfile,
    scenario: &Scenario,
    audio: &AudioArtifact,
    frames: &[StillFrame],
    language: &str,
) -> Value {
    let mut parts = vec![
        json!({ "text": analysis_prompt(profile, scenario, language) }),
        json!({ "inlineData": {
            "mimeType": audio.mime_type,
            "data": to_transport(&audio.bytes),
        }}),
    ];
    for frame in subsample_frames(frames) {
        parts.push(json!({ "inlineData": {
            "mimeType": StillFrame::MIME_TYPE,
            "data": to_transport(&frame.jpeg),
        }}));
    }

    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": analysis_schema(),
        }
    })
}

fn scenario_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "description": { "type": "STRING" },
            "role": { "type": "STRING" },
            "objective": { "type": "STRING" },
            "counterpart": { "type": "STRING" },
            "difficulty": { "type": "STRING" },
            "keyPoints": { "type": "ARRAY", "items": { "type": "STRING" } },
        },
        "required": ["title", "description", "role", "objective", "counterpart", "keyPoints"],
    })
}

fn analysis_schema() -> Value {
    let strings = json!({ "type": "ARRAY", "items": { "type": "STRING" } });
    json!({
        "type": "OBJECT",
        "properties": {
            "overallScore": { "type": "INTEGER" },
            "summary": { "type": "STRING" },
            "toneAnalysis": {
                "type": "OBJECT",
                "properties": {
                    "label": { "type": "STRING" },
                    "description": { "type": "STRING" },
                },
            },
            "bodyLanguageAnalysis": {
                "type": "OBJECT",
                "properties": {
                    "eyeContact": { "type": "STRING" },
                    "posture": { "type": "STRING" },
                    "gestures": { "type": "STRING" },
                },
            },
            "skillScores": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "skill": { "type": "STRING" },
                        "score": { "type": "INTEGER" },
                        "feedback": { "type": "STRING" },
                    },
                },
            },
            "strengths": strings.clone(),
            "weaknesses": strings.clone(),
            "nextSteps": strings,
        },
        "required": [
            "overallScore", "summary", "toneAnalysis", "bodyLanguageAnalysis",
            "skillScores", "strengths", "weaknesses", "nextSteps",
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile() -> UserProfile {
        UserProfile {
            name: "Sam".into(),
            major: "Engineering".into(),
            target_skill: "Leadership".into(),
        }
    }

    fn scenario() -> Scenario {
        Scenario {
            title: "Site delay".into(),
            description: "Contractor is three weeks late".into(),
            role: "Site lead".into(),
            objective: "Agree a recovery plan".into(),
            counterpart: "Contractor".into(),
            difficulty: "Medium".into(),
            key_points: vec!["Cost".into()],
        }
    }

    #[test]
    fn analysis_request_embeds_audio_and_at_most_ten_frames() {
        let audio = AudioArtifact {
            mime_type: "audio/wav".into(),
            bytes: vec![1, 2, 3],
            sample_rate: 16_000,
            samples: 0,
        };
        let frames: Vec<StillFrame> = (0..23)
            .map(|i| StillFrame {
                captured_at: Utc::now(),
                jpeg: vec![i as u8],
            })
            .collect();

        let body = analysis_request(&profile(), &scenario(), &audio, &frames, "English");
        let parts = body["contents"][0]["parts"].as_array().expect("parts");
        // prompt + audio + 8 subsampled frames
        assert_eq!(parts.len(), 10);
        assert_eq!(parts[1]["inlineData"]["mimeType"], "audio/wav");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[3]["inlineData"]["data"], to_transport(&[3]));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn scenario_request_asks_for_json_schema() {
        let body = scenario_request(&profile(), "Arabic");
        let schema = &body["generationConfig"]["responseSchema"];
        assert_eq!(schema["properties"]["keyPoints"]["type"], "ARRAY");
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("Arabic"));
    }

    #[test]
    fn response_text_requires_a_candidate() {
        let ok = json!({ "candidates": [{ "content": { "parts": [{ "text": "{}" }] } }] });
        assert_eq!(response_text(&ok).unwrap(), "{}");

        let empty = json!({ "candidates": [] });
        assert!(matches!(
            response_text(&empty),
            Err(ParleyError::Collaborator(_))
        ));
    }
}
