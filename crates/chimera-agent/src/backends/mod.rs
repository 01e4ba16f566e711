pub mod http;

use async_trait::async_trait;
use chimera_core::{ChimeraResult, TaskPayload, TaskType};
use serde::{Deserialize, Serialize};

/// Context the worker assembles before calling the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationContext {
    /// Summaries of recent interactions, newest first.
    pub recent_interactions: Vec<String>,
    pub goals: Vec<String>,
    pub trending_topics: Vec<String>,
    /// Planning state version the context was read at.
    pub state_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub task_type: TaskType,
    pub payload: TaskPayload,
    pub context: GenerationContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    /// The backend's own confidence in the draft, in [0, 1].
    #[serde(default)]
    pub confidence_self_assessment: Option<f64>,
}

/// Trait for content generation collaborators.
///
/// Implementations must classify failures: errors for which
/// [`ChimeraError::is_retryable`](chimera_core::ChimeraError::is_retryable)
/// is true are retried by the worker pool, anything else fails the task
/// immediately.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> ChimeraResult<GenerationResponse>;
}
