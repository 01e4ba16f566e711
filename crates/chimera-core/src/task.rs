use crate::{ChimeraError, ChimeraResult, Platform};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue lane of a task. Lower number = served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    /// Lane 1: mentions and trending topics.
    High = 1,
    /// Lane 2: analysis work.
    Medium = 2,
    /// Lane 3: scheduled, evergreen content.
    Low = 3,
}

impl Priority {
    /// All lanes, highest first.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Numeric lane value (1, 2 or 3).
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Zero-based lane index.
    pub fn lane(self) -> usize {
        self as usize - 1
    }
}

impl TryFrom<u8> for Priority {
    type Error = ChimeraError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::High),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::Low),
            other => Err(ChimeraError::InvalidPriority(other)),
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p.as_u8()
    }
}

/// Kind of work a task asks a worker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Draft an original post.
    GeneratePost,
    /// Draft a reply to a mention.
    GenerateReply,
    /// Summarize a cluster of articles into a content angle.
    AnalyzeTrends,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::GeneratePost => write!(f, "generate_post"),
            TaskType::GenerateReply => write!(f, "generate_reply"),
            TaskType::AnalyzeTrends => write!(f, "analyze_trends"),
        }
    }
}

/// A news article attached to a trend analysis task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Closed set of task payloads, one variant per [`TaskType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    GeneratePost {
        topic: String,
        platform: Platform,
        #[serde(default)]
        context_hint: Option<String>,
    },
    GenerateReply {
        mention_id: String,
        author: String,
        text: String,
        platform: Platform,
    },
    AnalyzeTrends {
        articles: Vec<Article>,
    },
}

impl TaskPayload {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskPayload::GeneratePost { .. } => TaskType::GeneratePost,
            TaskPayload::GenerateReply { .. } => TaskType::GenerateReply,
            TaskPayload::AnalyzeTrends { .. } => TaskType::AnalyzeTrends,
        }
    }

    /// Platform the produced content is destined for, if any.
    pub fn platform(&self) -> Option<Platform> {
        match self {
            TaskPayload::GeneratePost { platform, .. }
            | TaskPayload::GenerateReply { platform, .. } => Some(*platform),
            TaskPayload::AnalyzeTrends { .. } => None,
        }
    }

    /// Structural checks applied at the queue boundary.
    pub fn validate(&self) -> ChimeraResult<()> {
        match self {
            TaskPayload::GeneratePost { topic, .. } if topic.trim().is_empty() => Err(
                ChimeraError::InvalidTask("generate_post requires a topic".into()),
            ),
            TaskPayload::GenerateReply {
                mention_id, text, ..
            } if mention_id.is_empty() || text.trim().is_empty() => Err(ChimeraError::InvalidTask(
                "generate_reply requires a mention id and text".into(),
            )),
            TaskPayload::AnalyzeTrends { articles } if articles.is_empty() => Err(
                ChimeraError::InvalidTask("analyze_trends requires at least one article".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// A single atomic unit of work passed from the planner to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: Uuid,
    /// Raw lane number; validated into a [`Priority`] at enqueue time.
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub payload: TaskPayload,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    AgentTask::DEFAULT_MAX_RETRIES
}

impl AgentTask {
    /// Retry budget when the planner does not specify one.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Create a task created now that expires after `ttl`.
    pub fn new(payload: TaskPayload, priority: Priority, ttl: Duration) -> Self {
        Self::new_at(payload, priority, Utc::now(), ttl)
    }

    /// Create a task with an explicit creation instant.
    pub fn new_at(
        payload: TaskPayload,
        priority: Priority,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            priority: priority.as_u8(),
            created_at,
            expires_at: created_at + ttl,
            payload,
            retry_count: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn task_type(&self) -> TaskType {
        self.payload.task_type()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether another transient failure may still be retried.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Check every structural invariant and return the parsed lane.
    pub fn validate(&self) -> ChimeraResult<Priority> {
        let priority = Priority::try_from(self.priority)?;
        if self.expires_at <= self.created_at {
            return Err(ChimeraError::InvalidTask(format!(
                "task {} expires before it is created",
                self.id
            )));
        }
        if self.retry_count > self.max_retries {
            return Err(ChimeraError::InvalidTask(format!(
                "task {} has retry_count {} above max_retries {}",
                self.id, self.retry_count, self.max_retries
            )));
        }
        self.payload.validate()?;
        Ok(priority)
    }
}

/// Outcome category of a task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failure,
    /// The task was re-enqueued after a transient failure.
    Retry,
}

/// Result of a worker's execution of one task.
///
/// Exactly one of `output` / `error` is set: `output` for
/// [`TaskStatus::Success`], `error` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: Uuid,
    pub task_id: Uuid,
    pub worker_id: String,
    pub status: TaskStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub platform: Option<Platform>,
    /// Planning-state version the worker read while producing this result.
    pub state_version: u64,
    /// The backend's own confidence in the draft, when it reports one.
    #[serde(default)]
    pub self_confidence: Option<f64>,
    #[serde(default)]
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl TaskResult {
    fn base(task: &AgentTask, worker_id: &str, status: TaskStatus, state_version: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            worker_id: worker_id.to_string(),
            status,
            output: None,
            error: None,
            platform: task.payload.platform(),
            state_version,
            self_confidence: None,
            execution_time_ms: 0,
            created_at: Utc::now(),
        }
    }

    pub fn success(
        task: &AgentTask,
        worker_id: &str,
        output: impl Into<String>,
        state_version: u64,
    ) -> Self {
        let mut result = Self::base(task, worker_id, TaskStatus::Success, state_version);
        result.output = Some(output.into());
        result
    }

    pub fn failure(
        task: &AgentTask,
        worker_id: &str,
        error: impl Into<String>,
        state_version: u64,
    ) -> Self {
        let mut result = Self::base(task, worker_id, TaskStatus::Failure, state_version);
        result.error = Some(error.into());
        result
    }

    pub fn retry(
        task: &AgentTask,
        worker_id: &str,
        error: impl Into<String>,
        state_version: u64,
    ) -> Self {
        let mut result = Self::base(task, worker_id, TaskStatus::Retry, state_version);
        result.error = Some(error.into());
        result
    }

    pub fn with_self_confidence(mut self, confidence: Option<f64>) -> Self {
        self.self_confidence = confidence;
        self
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }
}
