use async_trait::async_trait;
use chimera_core::{Article, ChimeraError, ChimeraResult, Platform};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// A trending topic with the articles that make it trend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trend {
    pub topic: String,
    #[serde(default)]
    pub articles: Vec<Article>,
}

/// Someone addressing the agent on a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub author: String,
    pub text: String,
    pub platform: Platform,
}

/// Everything observed since the previous poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    #[serde(default)]
    pub trends: Vec<Trend>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.trends.is_empty() && self.mentions.is_empty()
    }

    fn merge(&mut self, other: Signals) {
        self.trends.extend(other.trends);
        self.mentions.extend(other.mentions);
    }
}

/// Inbound collaborator polled once per planning cycle.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn poll(&self) -> ChimeraResult<Signals>;
}

/// Signal source fed through an in-process channel.
///
/// Producers (a webhook handler, a test) push [`Signals`] through
/// [`InboxSignalSource::sender`]; each poll drains whatever arrived.
pub struct InboxSignalSource {
    tx: mpsc::UnboundedSender<Signals>,
    rx: Mutex<mpsc::UnboundedReceiver<Signals>>,
}

impl InboxSignalSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Signals> {
        self.tx.clone()
    }
}

impl Default for InboxSignalSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalSource for InboxSignalSource {
    async fn poll(&self) -> ChimeraResult<Signals> {
        let mut rx = self.rx.lock().await;
        let mut signals = Signals::default();
        while let Ok(batch) = rx.try_recv() {
            signals.merge(batch);
        }
        Ok(signals)
    }
}

/// Signal source that GETs a JSON [`Signals`] document from an endpoint.
pub struct HttpSignalSource {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpSignalSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl SignalSource for HttpSignalSource {
    async fn poll(&self) -> ChimeraResult<Signals> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ChimeraError::Http(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ChimeraError::Http(format!("signal source returned {status}")));
        }
        resp.json::<Signals>()
            .await
            .map_err(|e| ChimeraError::Http(format!("malformed signals: {e}")))
    }
}
