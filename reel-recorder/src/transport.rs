//! Delivery of recorder messages to the server.
//!
//! Both paths are fire-and-forget: failures are logged at debug level and
//! dropped. Losing telemetry is preferable to stalling the host.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use reel_core::models::{EventBatch, SessionMetadata};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::config::RecorderConfig;
use crate::error::RecorderError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Metadata(SessionMetadata),
    Events(EventBatch),
}

impl Message {
    /// Path suffix under the endpoint base.
    pub fn suffix(&self) -> &'static str {
        match self {
            Message::Metadata(_) => "metadata",
            Message::Events(_) => "events",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Message::Metadata(m) => &m.session_id,
            Message::Events(b) => &b.session_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Spawned in the background while the host keeps running.
    Async,
    /// Must survive the host shutting down.
    Teardown,
}

pub trait Transport: Send + Sync {
    /// Best-effort delivery. Returns immediately.
    fn send(&self, message: Message);

    /// Delivery attempted even while the host is shutting down. Returns
    /// immediately.
    fn send_on_teardown(&self, message: Message);
}

/// JSON over HTTP POST to `{endpoint_base}/{metadata|events}`.
///
/// Normal-path messages go through one worker task per transport (shared by
/// clones) that delivers them strictly one after another, so the server sees
/// them in send order. The worker starts on the first `send` and stops once
/// every clone is dropped.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: Endpoint,
    worker: Arc<OnceLock<mpsc::UnboundedSender<Message>>>,
}

#[derive(Debug, Clone)]
struct Endpoint {
    client: reqwest::Client,
    config: RecorderConfig,
}

impl Endpoint {
    fn url_for(&self, message: &Message) -> String {
        self.config.endpoint(message.suffix())
    }

    async fn deliver(&self, message: &Message) -> Result<(), RecorderError> {
        self.client
            .post(self.url_for(message))
            .json(message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl HttpTransport {
    pub fn new(config: RecorderConfig) -> Result<Self, RecorderError> {
        config.validate()?;
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            endpoint: Endpoint { client, config },
            worker: Arc::new(OnceLock::new()),
        })
    }

    pub fn url_for(&self, message: &Message) -> String {
        self.endpoint.url_for(message)
    }

    /// Awaitable delivery with the outcome. Bypasses the send queue.
    pub async fn deliver(&self, message: &Message) -> Result<(), RecorderError> {
        self.endpoint.deliver(message).await
    }

    fn spawn_worker(&self, handle: &Handle) -> mpsc::UnboundedSender<Message> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        // Owns only the endpoint so the channel closes with the last clone
        let endpoint = self.endpoint.clone();
        handle.spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = endpoint.deliver(&message).await {
                    tracing::debug!(
                        session_id = message.session_id(),
                        kind = message.suffix(),
                        "Delivery failed, dropping: {}",
                        e
                    );
                }
            }
        });
        tx
    }
}

impl Transport for HttpTransport {
    fn send(&self, message: Message) {
        let Ok(handle) = Handle::try_current() else {
            tracing::debug!("No runtime for async delivery, using teardown path");
            return self.send_on_teardown(message);
        };

        let worker = self.worker.get_or_init(|| self.spawn_worker(&handle));
        if let Err(mpsc::error::SendError(message)) = worker.send(message) {
            // Worker's runtime has shut down
            tracing::debug!("Delivery worker gone, using teardown path");
            self.send_on_teardown(message);
        }
    }

    fn send_on_teardown(&self, message: Message) {
        let url = self.url_for(&message);
        let body = match serde_json::to_vec(&message) {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!("Failed to encode teardown message: {}", e);
                return;
            }
        };

        // A detached OS thread keeps going after the async runtime is gone.
        let spawned = std::thread::Builder::new()
            .name("reel-teardown".to_string())
            .spawn(move || {
                let result = reqwest::blocking::Client::builder()
                    .timeout(TEARDOWN_TIMEOUT)
                    .build()
                    .and_then(|client| {
                        client
                            .post(&url)
                            .header(CONTENT_TYPE, "application/json")
                            .body(body)
                            .send()
                    });
                if let Err(e) = result {
                    tracing::debug!("Teardown delivery to {} failed: {}", url, e);
                }
            });

        if let Err(e) = spawned {
            tracing::debug!("Failed to spawn teardown delivery: {}", e);
        }
    }
}

/// Records every message instead of sending it. For embedding hosts that
/// forward messages themselves, and for tests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    deliveries: Mutex<Vec<(Delivery, Message)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<(Delivery, Message)> {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Event batches sent through `mode`, in send order.
    pub fn batches(&self, mode: Delivery) -> Vec<EventBatch> {
        self.deliveries()
            .into_iter()
            .filter_map(|(d, m)| match m {
                Message::Events(batch) if d == mode => Some(batch),
                _ => None,
            })
            .collect()
    }

    pub fn metadata(&self) -> Vec<SessionMetadata> {
        self.deliveries()
            .into_iter()
            .filter_map(|(_, m)| match m {
                Message::Metadata(meta) => Some(meta),
                _ => None,
            })
            .collect()
    }

    fn record(&self, delivery: Delivery, message: Message) {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((delivery, message));
    }
}

impl Transport for MemoryTransport {
    fn send(&self, message: Message) {
        self.record(Delivery::Async, message);
    }

    fn send_on_teardown(&self, message: Message) {
        self.record(Delivery::Teardown, message);
    }
}
