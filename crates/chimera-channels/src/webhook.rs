use crate::publisher::{PlatformPublisher, PublishRequest, PublishResponse, RATE_LIMIT_EXCEEDED};
use async_trait::async_trait;
use chimera_core::{ChimeraError, ChimeraResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    content: &'a str,
    platform: chimera_core::Platform,
}

#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    post_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

/// Publishes by POSTing `{content, platform}` to a webhook.
///
/// A 2xx reply counts as published; the post id is read from `post_id` or
/// `id` in the JSON body when present. HTTP 429 maps to
/// [`RATE_LIMIT_EXCEEDED`]; other failures report the status code.
pub struct WebhookPublisher {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookPublisher {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PlatformPublisher for WebhookPublisher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn publish(&self, request: &PublishRequest) -> ChimeraResult<PublishResponse> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut builder = self
            .client
            .post(&self.config.url)
            .timeout(timeout)
            .json(&WebhookBody {
                content: &request.content,
                platform: request.platform,
            });
        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ChimeraError::Timeout(timeout)
            } else {
                ChimeraError::Http(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            warn!(platform = %request.platform, "Webhook reported rate limit");
            return Ok(PublishResponse::failed(RATE_LIMIT_EXCEEDED));
        }
        if !status.is_success() {
            warn!(platform = %request.platform, %status, "Webhook publish failed");
            return Ok(PublishResponse::failed(status.as_u16().to_string()));
        }

        let text = resp.text().await.unwrap_or_default();
        let post_id = serde_json::from_str::<WebhookReply>(&text)
            .ok()
            .and_then(|r| r.post_id.or(r.id))
            .unwrap_or_default();
        debug!(platform = %request.platform, post_id = %post_id, "Webhook publish accepted");
        Ok(PublishResponse {
            success: true,
            post_id: Some(post_id).filter(|id| !id.is_empty()),
            error_code: None,
        })
    }
}
