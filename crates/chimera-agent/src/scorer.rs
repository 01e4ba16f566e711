use async_trait::async_trait;
use chimera_core::{ChimeraResult, ComponentScores, Platform};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub content: String,
    /// Target platform; absent for internal artifacts such as trend analyses.
    pub platform: Option<Platform>,
}

/// Trait for content scoring collaborators used by the judge.
///
/// Each returned component must lie in [0, 1]; the judge clamps anything
/// outside that range before deciding.
#[async_trait]
pub trait ContentScorer: Send + Sync {
    async fn score(&self, request: &ScoreRequest) -> ChimeraResult<ComponentScores>;
}

const SAFETY_SAFE: f64 = 1.0;
const SAFETY_NEEDS_REVIEW: f64 = 0.6;
const SAFETY_UNSAFE: f64 = 0.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default)]
    pub banned_keywords: Vec<String>,
    #[serde(default)]
    pub sensitive_topics: Vec<String>,
    #[serde(default)]
    pub auto_escalate_patterns: Vec<String>,
    #[serde(default = "default_x_char_limit")]
    pub x_char_limit: usize,
    #[serde(default = "default_linkedin_char_limit")]
    pub linkedin_char_limit: usize,
    /// Persona fidelity is a model concern; this adapter reports a constant.
    #[serde(default = "default_persona_score")]
    pub persona_score: f64,
    #[serde(default = "default_quality_score")]
    pub quality_score: f64,
}

fn default_x_char_limit() -> usize {
    280
}

fn default_linkedin_char_limit() -> usize {
    3000
}

fn default_persona_score() -> f64 {
    0.9
}

fn default_quality_score() -> f64 {
    0.8
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            banned_keywords: Vec::new(),
            sensitive_topics: Vec::new(),
            auto_escalate_patterns: Vec::new(),
            x_char_limit: default_x_char_limit(),
            linkedin_char_limit: default_linkedin_char_limit(),
            persona_score: default_persona_score(),
            quality_score: default_quality_score(),
        }
    }
}

impl ScorerConfig {
    pub fn char_limit(&self, platform: Platform) -> usize {
        match platform {
            Platform::X => self.x_char_limit,
            Platform::LinkedIn => self.linkedin_char_limit,
        }
    }
}

/// Deterministic scorer: keyword lists drive safety, a character limit
/// drives platform compliance.
pub struct RuleBasedScorer {
    config: ScorerConfig,
}

impl RuleBasedScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    fn safety(&self, content: &str) -> f64 {
        let lower = content.to_lowercase();
        let hit = |list: &[String]| {
            list.iter()
                .find(|needle| lower.contains(&needle.to_lowercase()))
                .cloned()
        };

        if let Some(keyword) = hit(&self.config.banned_keywords) {
            warn!(keyword = %keyword, "Banned keyword detected");
            return SAFETY_UNSAFE;
        }
        if let Some(pattern) = hit(&self.config.auto_escalate_patterns) {
            warn!(pattern = %pattern, "Auto-escalate pattern detected");
            return SAFETY_NEEDS_REVIEW;
        }
        if let Some(topic) = hit(&self.config.sensitive_topics) {
            info!(topic = %topic, "Sensitive topic detected");
            return SAFETY_NEEDS_REVIEW;
        }
        SAFETY_SAFE
    }

    fn platform(&self, content: &str, platform: Option<Platform>) -> f64 {
        let Some(platform) = platform else {
            return 1.0;
        };
        let limit = self.config.char_limit(platform);
        let len = content.chars().count();
        if len > limit {
            warn!(%platform, len, limit, "Content exceeds character limit");
            0.0
        } else {
            1.0
        }
    }
}

#[async_trait]
impl ContentScorer for RuleBasedScorer {
    async fn score(&self, request: &ScoreRequest) -> ChimeraResult<ComponentScores> {
        Ok(ComponentScores::new(
            self.config.persona_score,
            self.safety(&request.content),
            self.platform(&request.content, request.platform),
            self.config.quality_score,
        ))
    }
}
