//! Collaborators on either side of a session: scenario generation before it,
//! performance analysis after it.
//!
//! Both are plain request/response calls behind [`CoachingBackend`]. The
//! session never depends on them; a host wires them around it.

#[cfg(feature = "gemini")]
pub mod gemini;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::{frames::StillFrame, recorder::AudioArtifact};

/// Who is practising, and what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub major: String,
    pub target_skill: String,
}

/// The roleplay a session is built around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub title: String,
    pub description: String,
    /// The user's role.
    pub role: String,
    pub objective: String,
    /// Who the agent plays.
    pub counterpart: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillScore {
    pub skill: String,
    /// 0-100.
    pub score: u8,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneAnalysis {
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyLanguageAnalysis {
    pub eye_contact: String,
    pub posture: String,
    pub gestures: String,
}

/// Scored feedback on a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub overall_score: u8,
    pub summary: String,
    pub tone_analysis: ToneAnalysis,
    pub body_language_analysis: BodyLanguageAnalysis,
    #[serde(default)]
    pub skill_scores: Vec<SkillScore>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// Scenario generation and performance analysis.
pub trait CoachingBackend: Send + Sync {
    fn generate_scenario<'a>(&'a self, profile: &'a UserProfile) -> BoxFuture<'a, Result<Scenario>>;

    /// `frames` is the whole session sequence; implementations thin it with
    /// [`crate::media::frames::subsample_frames`] before sending.
    fn analyze_performance<'a>(
        &'a self,
        profile: &'a UserProfile,
        scenario: &'a Scenario,
        audio: &'a AudioArtifact,
        frames: &'a [StillFrame],
    ) -> BoxFuture<'a, Result<AnalysisResult>>;
}

pub(crate) fn scenario_prompt(profile: &UserProfile, language: &str) -> String {
    format!(
        "You are an expert educational curriculum designer for university students.\n\
         Create a realistic, professional roleplay case study (scenario) for a student.\n\n\
         Student major: {major}\n\
         Target soft skill: {skill}\n\
         Language: {language} (all output must be in {language}).\n\n\
         Requirements:\n\
         1. The scenario should be specific to their field of study but focus on the soft skill.\n\
         2. Keep the 'description' field very concise (max 3-4 sentences).\n\
         3. The content must be high quality and realistic, just written briefly.\n\n\
         Example: Law student + Negotiation -> Settlement conference.\n\
         Example: Engineering + Leadership -> Managing a site delay with contractors.\n\n\
         Make it challenging but achievable.",
        major = profile.major,
        skill = profile.target_skill,
    )
}

pub(crate) fn analysis_prompt(profile: &UserProfile, scenario: &Scenario, language: &str) -> String {
    format!(
        "Act as a world-class communication coach and behavioral psychologist.\n\
         Analyze this recorded session of a university student practicing a soft skill scenario.\n\n\
         Student context:\n\
         - Major: {major}\n\
         - Skill: {skill}\n\
         - Scenario: {title} ({description})\n\
         - Objective: {objective}\n\n\
         Inputs provided:\n\
         1. Audio recording of their speech.\n\
         2. Video frames (screenshots) from their camera to analyze body language.\n\n\
         Evaluate their performance on:\n\
         1. Voice: tone, confidence, pacing, clarity.\n\
         2. Body language: eye contact, posture, professional demeanor.\n\
         3. Content: logic, persuasion, relevance to the scenario (did they solve the problem?).\n\n\
         Provide output in {language}. Be constructive, encouraging, but honest.",
        major = profile.major,
        skill = profile.target_skill,
        title = scenario.title,
        description = scenario.description,
        objective = scenario.objective,
    )
}
