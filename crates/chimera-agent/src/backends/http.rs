use super::{GenerationBackend, GenerationRequest, GenerationResponse};
use async_trait::async_trait;
use chimera_core::{ChimeraError, ChimeraResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    /// Full URL the generation request is POSTed to.
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

/// Generation backend that POSTs the request as JSON and expects a
/// [`GenerationResponse`] body back.
///
/// Status mapping: 429 and 5xx are transient, other 4xx are treated as a bad
/// request and never retried.
pub struct HttpGenerationBackend {
    config: HttpBackendConfig,
    http: reqwest::Client,
}

impl HttpGenerationBackend {
    pub fn new(config: HttpBackendConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn generate(&self, request: &GenerationRequest) -> ChimeraResult<GenerationResponse> {
        let mut builder = self
            .http
            .post(&self.config.endpoint)
            .timeout(self.timeout())
            .json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ChimeraError::Timeout(self.timeout())
            } else {
                ChimeraError::Http(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let msg = format!("generation backend returned {status}: {body}");
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                ChimeraError::TransientBackend(msg)
            } else {
                ChimeraError::NonRetryableInput(msg)
            });
        }

        let parsed: GenerationResponse = resp
            .json()
            .await
            .map_err(|e| ChimeraError::TransientBackend(format!("malformed response: {e}")))?;

        if parsed.content.trim().is_empty() {
            return Err(ChimeraError::TransientBackend(
                "generation backend returned empty content".into(),
            ));
        }
        Ok(parsed)
    }
}
