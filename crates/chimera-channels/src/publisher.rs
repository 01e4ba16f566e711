use async_trait::async_trait;
use chimera_core::{ChimeraResult, Platform};
use serde::{Deserialize, Serialize};

/// Error code a publisher reports when the platform itself refused the post
/// for rate reasons. The gate treats it as authoritative over local counters.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub content: String,
    pub platform: Platform,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

impl PublishResponse {
    pub fn published(post_id: impl Into<String>) -> Self {
        Self {
            success: true,
            post_id: Some(post_id.into()),
            error_code: None,
        }
    }

    pub fn failed(error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            post_id: None,
            error_code: Some(error_code.into()),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.error_code.as_deref() == Some(RATE_LIMIT_EXCEEDED)
    }
}

/// Outbound publishing collaborator.
///
/// An `Err` means the call itself failed (transport, timeout); a platform
/// refusal is an `Ok` response with `success == false`.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    fn name(&self) -> &str;
    async fn publish(&self, request: &PublishRequest) -> ChimeraResult<PublishResponse>;
}
