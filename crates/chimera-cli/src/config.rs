//! `chimera.toml` loading.

use chimera_agent::{HttpBackendConfig, ScorerConfig};
use chimera_channels::WebhookConfig;
use chimera_orchestrator::SwarmConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that supplies the generation API key when the
/// config file leaves it out.
pub const API_KEY_ENV: &str = "CHIMERA_GENERATION_API_KEY";
/// Environment variable that supplies the publisher token.
pub const PUBLISHER_TOKEN_ENV: &str = "CHIMERA_PUBLISHER_TOKEN";

#[derive(Debug, Deserialize)]
pub struct ChimeraConfig {
    #[serde(default)]
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub generation: Option<HttpBackendConfig>,
    #[serde(default)]
    pub publisher: Option<WebhookConfig>,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct SignalsConfig {
    /// Endpoint returning trends and mentions as JSON. Without it the swarm
    /// only runs scheduled posts.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_signals_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_signals_timeout_secs(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_signals_timeout_secs() -> u64 {
    10
}

impl ChimeraConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {e}", path.display())
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut config: ChimeraConfig = toml::from_str(text)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Fill secrets the file left out from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(generation) = self.generation.as_mut() {
            if generation.api_key.is_none() {
                generation.api_key = lookup(API_KEY_ENV);
            }
        }
        if let Some(publisher) = self.publisher.as_mut() {
            if publisher.token.is_none() {
                publisher.token = lookup(PUBLISHER_TOKEN_ENV);
            }
        }
    }

    /// Everything `run` needs, checked up front.
    pub fn check(&self) -> anyhow::Result<()> {
        self.swarm.validate()?;
        if self.generation.is_none() {
            anyhow::bail!("no [generation] backend configured");
        }
        if self.publisher.is_none() && !self.swarm.dry_run {
            anyhow::bail!("no [publisher] configured; set swarm.dry_run or pass --dry-run");
        }
        Ok(())
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.data_dir.join("audit")
    }
}
