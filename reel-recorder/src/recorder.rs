use std::sync::Arc;

use chrono::Utc;
use reel_core::models::{SessionMetadata, Viewport};
use tokio::sync::broadcast;

use crate::buffer::BatchBuffer;
use crate::capture::{CaptureEngine, CaptureOptions, Disposer};
use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::lifecycle::LifecycleSignal;
use crate::transport::{HttpTransport, Message, Transport};

/// What the host knows about the page being recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    pub user_agent: String,
    pub viewport: Viewport,
}

impl PageInfo {
    pub fn metadata(&self, session_id: &str) -> SessionMetadata {
        SessionMetadata {
            session_id: session_id.to_string(),
            url: self.url.clone(),
            title: self.title.clone(),
            user_agent: self.user_agent.clone(),
            timestamp: Utc::now().to_rfc3339(),
            viewport: self.viewport,
        }
    }
}

/// One recording: sends the session metadata on start, then feeds every
/// captured event into a [`BatchBuffer`] until stopped or dropped.
#[derive(Debug)]
pub struct Recorder {
    buffer: BatchBuffer,
    disposer: Option<Disposer>,
}

impl Recorder {
    pub fn start(
        engine: &dyn CaptureEngine,
        options: &CaptureOptions,
        page: &PageInfo,
        config: RecorderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RecorderError> {
        let buffer = BatchBuffer::new(config, transport.clone())?;
        transport.send(Message::Metadata(page.metadata(buffer.session_id())));

        let sink = buffer.clone();
        let disposer = engine.on_event(options, Box::new(move |event| sink.push(event)));

        tracing::debug!(session_id = buffer.session_id(), url = %page.url, "Recording started");
        Ok(Self {
            buffer,
            disposer: Some(disposer),
        })
    }

    /// [`start`](Self::start) with an [`HttpTransport`] built from `config`.
    pub fn start_http(
        engine: &dyn CaptureEngine,
        options: &CaptureOptions,
        page: &PageInfo,
        config: RecorderConfig,
    ) -> Result<Self, RecorderError> {
        let transport = Arc::new(HttpTransport::new(config.clone())?);
        Self::start(engine, options, page, config, transport)
    }

    pub fn session_id(&self) -> &str {
        self.buffer.session_id()
    }

    pub fn buffer(&self) -> &BatchBuffer {
        &self.buffer
    }

    pub fn watch_lifecycle(&self, signals: broadcast::Receiver<LifecycleSignal>) {
        self.buffer.watch_lifecycle(signals);
    }

    /// Stop capturing, then flush what is pending on the teardown path.
    /// Returns the number of events in that final flush.
    pub fn stop(mut self) -> usize {
        self.shutdown()
    }

    fn shutdown(&mut self) -> usize {
        if let Some(disposer) = self.disposer.take() {
            disposer.dispose();
        }
        self.buffer.teardown()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}
