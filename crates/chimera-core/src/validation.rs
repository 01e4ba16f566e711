use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Weight of the persona-alignment component.
pub const PERSONA_WEIGHT: f64 = 0.30;
/// Weight of the safety component.
pub const SAFETY_WEIGHT: f64 = 0.40;
/// Weight of the platform-compliance component.
pub const PLATFORM_WEIGHT: f64 = 0.20;
/// Weight of the quality component.
pub const QUALITY_WEIGHT: f64 = 0.10;

/// Safety below this rejects regardless of the composite score.
pub const SAFETY_GATE: f64 = 0.5;
/// Composite score at or above this is approved automatically.
pub const AUTO_APPROVE_THRESHOLD: f64 = 0.8;
/// Composite score below this is rejected automatically.
pub const AUTO_REJECT_THRESHOLD: f64 = 0.5;
/// Slack for float error in the weighted sum when comparing to thresholds.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// The judge's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
    Escalate,
}

/// One of the four independently scored content dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreComponent {
    Persona,
    Safety,
    Platform,
    Quality,
}

impl std::fmt::Display for ScoreComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreComponent::Persona => write!(f, "persona"),
            ScoreComponent::Safety => write!(f, "safety"),
            ScoreComponent::Platform => write!(f, "platform"),
            ScoreComponent::Quality => write!(f, "quality"),
        }
    }
}

/// Per-dimension scores supplied by the content scorer, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub persona: f64,
    pub safety: f64,
    pub platform: f64,
    pub quality: f64,
}

impl ComponentScores {
    pub fn new(persona: f64, safety: f64, platform: f64, quality: f64) -> Self {
        Self {
            persona,
            safety,
            platform,
            quality,
        }
        .clamped()
    }

    /// All components zero; used when content could not be scored at all.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Force every component into `[0, 1]`. NaN is treated as 0.
    pub fn clamped(self) -> Self {
        let clamp = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        Self {
            persona: clamp(self.persona),
            safety: clamp(self.safety),
            platform: clamp(self.platform),
            quality: clamp(self.quality),
        }
    }

    /// Composite confidence score.
    pub fn confidence(&self) -> f64 {
        PERSONA_WEIGHT * self.persona
            + SAFETY_WEIGHT * self.safety
            + PLATFORM_WEIGHT * self.platform
            + QUALITY_WEIGHT * self.quality
    }

    /// The lowest-scoring component. Ties go to the earlier of
    /// persona, safety, platform, quality.
    pub fn lowest(&self) -> ScoreComponent {
        let ordered = [
            (ScoreComponent::Persona, self.persona),
            (ScoreComponent::Safety, self.safety),
            (ScoreComponent::Platform, self.platform),
            (ScoreComponent::Quality, self.quality),
        ];
        let mut lowest = ordered[0];
        for candidate in ordered.into_iter().skip(1) {
            if candidate.1 < lowest.1 {
                lowest = candidate;
            }
        }
        lowest.0
    }
}

/// Why a result ended up rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Safety score under the hard gate.
    SafetyGate,
    /// Composite score under the auto-reject threshold.
    LowConfidence,
    /// A human reviewer rejected it.
    HumanRejected,
    /// Nobody reviewed it within the HITL window.
    HitlTimeout,
    /// The worker reported a failure instead of content.
    TaskFailed,
    /// The content scorer could not be reached.
    ScorerUnavailable,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectionReason::SafetyGate => "safety_gate",
            RejectionReason::LowConfidence => "low_confidence",
            RejectionReason::HumanRejected => "human_rejected",
            RejectionReason::HitlTimeout => "hitl_timeout",
            RejectionReason::TaskFailed => "task_failed",
            RejectionReason::ScorerUnavailable => "scorer_unavailable",
        };
        write!(f, "{s}")
    }
}

/// Which step produced a validation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStage {
    /// Automatic scoring by the judge.
    Judge,
    /// Human decision or HITL expiry.
    Hitl,
}

/// Lifecycle of a task result under review.
///
/// `received → scored → {approved, rejected, escalated}`,
/// `escalated → {approved, rejected}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Received,
    Scored,
    Approved,
    Rejected,
    Escalated,
}

impl ReviewState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReviewState::Approved | ReviewState::Rejected)
    }

    pub fn can_transition_to(self, next: ReviewState) -> bool {
        use ReviewState::*;
        matches!(
            (self, next),
            (Received, Scored)
                | (Received, Rejected)
                | (Scored, Approved)
                | (Scored, Rejected)
                | (Scored, Escalated)
                | (Escalated, Approved)
                | (Escalated, Rejected)
        )
    }
}

/// Apply the decision rule to a set of component scores.
///
/// Returns the decision plus the escalation or rejection reason that goes
/// with it.
pub fn decide(
    scores: &ComponentScores,
) -> (Decision, Option<ScoreComponent>, Option<RejectionReason>) {
    if scores.safety < SAFETY_GATE {
        return (Decision::Reject, None, Some(RejectionReason::SafetyGate));
    }
    let confidence = scores.confidence();
    if confidence >= AUTO_APPROVE_THRESHOLD - THRESHOLD_EPSILON {
        (Decision::Approve, None, None)
    } else if confidence < AUTO_REJECT_THRESHOLD - THRESHOLD_EPSILON {
        (Decision::Reject, None, Some(RejectionReason::LowConfidence))
    } else {
        (Decision::Escalate, Some(scores.lowest()), None)
    }
}

/// An immutable validation verdict on one task result.
///
/// A later decision on the same result (human review, HITL timeout) creates
/// a new record through [`ValidationResult::revalidate`]; records are never
/// mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: Uuid,
    pub result_id: Uuid,
    pub decision: Decision,
    pub confidence_score: f64,
    pub component_scores: ComponentScores,
    /// Planning-state version in force when the decision was made.
    pub occ_token: u64,
    /// Set iff `decision == Escalate`.
    pub escalation_reason: Option<ScoreComponent>,
    pub rejection_reason: Option<RejectionReason>,
    pub stage: ValidationStage,
    #[serde(default)]
    pub reviewer: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ValidationResult {
    /// Score a result and apply the decision rule.
    pub fn from_scores(
        result_id: Uuid,
        scores: ComponentScores,
        occ_token: u64,
        at: DateTime<Utc>,
    ) -> Self {
        let scores = scores.clamped();
        let (decision, escalation_reason, rejection_reason) = decide(&scores);
        Self {
            id: Uuid::new_v4(),
            result_id,
            decision,
            confidence_score: scores.confidence(),
            component_scores: scores,
            occ_token,
            escalation_reason,
            rejection_reason,
            stage: ValidationStage::Judge,
            reviewer: None,
            created_at: at,
        }
    }

    /// Reject a result without scoring it.
    pub fn rejected(
        result_id: Uuid,
        reason: RejectionReason,
        occ_token: u64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            result_id,
            decision: Decision::Reject,
            confidence_score: 0.0,
            component_scores: ComponentScores::zero(),
            occ_token,
            escalation_reason: None,
            rejection_reason: Some(reason),
            stage: ValidationStage::Judge,
            reviewer: None,
            created_at: at,
        }
    }

    /// A new HITL-stage record resolving this escalated one.
    ///
    /// Scores carry over; the decision, reason, reviewer and token are new.
    pub fn revalidate(
        &self,
        approved: bool,
        reason: Option<RejectionReason>,
        reviewer: Option<String>,
        occ_token: u64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            result_id: self.result_id,
            decision: if approved {
                Decision::Approve
            } else {
                Decision::Reject
            },
            confidence_score: self.confidence_score,
            component_scores: self.component_scores,
            occ_token,
            escalation_reason: None,
            rejection_reason: if approved { None } else { reason },
            stage: ValidationStage::Hitl,
            reviewer,
            created_at: at,
        }
    }

    /// Review state this record leaves the result in.
    pub fn state(&self) -> ReviewState {
        match self.decision {
            Decision::Approve => ReviewState::Approved,
            Decision::Reject => ReviewState::Rejected,
            Decision::Escalate => ReviewState::Escalated,
        }
    }
}
