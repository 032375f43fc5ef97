//! Accumulates capture events and flushes them as batches.
//!
//! A flush happens when the pending list reaches `batch_size`, when the
//! batch timer fires, when the page is hidden, or on teardown. Teardown
//! flushes through the transport's teardown path and closes the buffer;
//! later events are dropped.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use reel_core::models::EventBatch;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::lifecycle::{LifecycleSignal, LifecycleSubscription};
use crate::session_id;
use crate::transport::{Delivery, Message, Transport};

/// Cheap to clone; clones share the same pending list.
#[derive(Clone)]
pub struct BatchBuffer {
    inner: Arc<Inner>,
}

struct Inner {
    session_id: String,
    config: RecorderConfig,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    state: Mutex<BufferState>,
}

#[derive(Default)]
struct BufferState {
    pending: Vec<Value>,
    /// Armed timer and its generation. A timer only flushes if it is still
    /// the armed one when it fires.
    timer: Option<(u64, JoinHandle<()>)>,
    next_generation: u64,
    closed: bool,
    subscriptions: Vec<LifecycleSubscription>,
}

impl BatchBuffer {
    /// Create a buffer with a freshly generated session id. Must be called
    /// from within a tokio runtime, which drives the batch timer.
    pub fn new(
        config: RecorderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RecorderError> {
        Self::with_session_id(session_id::generate(), config, transport)
    }

    pub fn with_session_id(
        session_id: impl Into<String>,
        config: RecorderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, RecorderError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| RecorderError::NoRuntime)?;
        Ok(Self {
            inner: Arc::new(Inner {
                session_id: session_id.into(),
                config,
                transport,
                runtime,
                state: Mutex::new(BufferState::default()),
            }),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn timer_armed(&self) -> bool {
        self.lock().timer.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Append one event, flushing if the batch is full and arming the timer
    /// otherwise.
    pub fn push(&self, event: Value) {
        let mut state = self.lock();
        if state.closed {
            tracing::debug!(session_id = %self.inner.session_id, "Buffer closed, dropping event");
            return;
        }

        state.pending.push(event);
        if state.pending.len() >= self.inner.config.batch_size {
            let batch = self.take_batch(&mut state);
            drop(state);
            self.deliver(batch, Delivery::Async);
        } else if state.timer.is_none() {
            self.arm_timer(&mut state);
        }
    }

    /// Send pending events on the normal path. Returns how many were sent.
    pub fn flush(&self) -> usize {
        let batch = self.take_batch(&mut self.lock());
        self.deliver(batch, Delivery::Async)
    }

    /// The page was hidden: flush on the normal path.
    pub fn on_hidden(&self) -> usize {
        self.flush()
    }

    /// Flush on the teardown path, close the buffer and cancel lifecycle
    /// subscriptions. Later calls send nothing.
    pub fn teardown(&self) -> usize {
        let (batch, subscriptions) = {
            let mut state = self.lock();
            state.closed = true;
            let batch = self.take_batch(&mut state);
            (batch, std::mem::take(&mut state.subscriptions))
        };

        let sent = self.deliver(batch, Delivery::Teardown);
        for subscription in subscriptions {
            subscription.cancel();
        }
        sent
    }

    /// React to lifecycle signals from `signals` until teardown. The
    /// subscription is owned by the buffer.
    pub fn watch_lifecycle(&self, mut signals: broadcast::Receiver<LifecycleSignal>) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = self.inner.runtime.spawn(async move {
            loop {
                let signal = match signals.recv().await {
                    Ok(signal) => signal,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Lifecycle listener lagged by {} signals", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let Some(inner) = weak.upgrade() else { break };
                let buffer = BatchBuffer { inner };
                match signal {
                    LifecycleSignal::Hidden => {
                        buffer.on_hidden();
                    }
                    LifecycleSignal::Visible => {}
                    LifecycleSignal::Teardown => {
                        buffer.teardown();
                        break;
                    }
                }
            }
        });

        let subscription = LifecycleSubscription::new(handle);
        let mut state = self.lock();
        if state.closed {
            subscription.cancel();
        } else {
            state.subscriptions.push(subscription);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Disarm the timer and move pending events into a batch.
    fn take_batch(&self, state: &mut BufferState) -> Option<EventBatch> {
        if let Some((_, timer)) = state.timer.take() {
            timer.abort();
        }
        if state.pending.is_empty() {
            return None;
        }
        Some(EventBatch {
            session_id: self.inner.session_id.clone(),
            events: std::mem::take(&mut state.pending),
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    fn arm_timer(&self, state: &mut BufferState) {
        let generation = state.next_generation;
        state.next_generation += 1;

        let buffer = self.clone();
        let delay = self.inner.config.batch_timeout();
        let handle = self.inner.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            buffer.on_timer(generation);
        });
        state.timer = Some((generation, handle));
    }

    fn on_timer(&self, generation: u64) {
        let batch = {
            let mut state = self.lock();
            match &state.timer {
                Some((armed, _)) if *armed == generation => {
                    // This task is the timer; release it rather than abort.
                    state.timer = None;
                }
                _ => return,
            }
            self.take_batch(&mut state)
        };
        self.deliver(batch, Delivery::Async);
    }

    fn deliver(&self, batch: Option<EventBatch>, mode: Delivery) -> usize {
        let Some(batch) = batch else { return 0 };
        let count = batch.events.len();
        tracing::debug!(
            session_id = %self.inner.session_id,
            events = count,
            teardown = mode == Delivery::Teardown,
            "Flushing batch"
        );

        let message = Message::Events(batch);
        match mode {
            Delivery::Async => self.inner.transport.send(message),
            Delivery::Teardown => self.inner.transport.send_on_teardown(message),
        }
        count
    }
}

impl std::fmt::Debug for BatchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchBuffer")
            .field("session_id", &self.inner.session_id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use std::time::Duration;

    fn buffer() -> (BatchBuffer, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let buffer = BatchBuffer::with_session_id(
            "session_test",
            RecorderConfig::default(),
            transport.clone(),
        )
        .unwrap();
        (buffer, transport)
    }

    fn event(n: usize) -> Value {
        json!({"type": 3, "n": n})
    }

    #[test]
    fn test_requires_runtime() {
        let result = BatchBuffer::new(RecorderConfig::default(), Arc::new(MemoryTransport::new()));
        assert!(matches!(result, Err(RecorderError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = RecorderConfig {
            batch_size: 0,
            ..RecorderConfig::default()
        };
        let result = BatchBuffer::new(config, Arc::new(MemoryTransport::new()));
        assert!(matches!(result, Err(RecorderError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_flushes_immediately() {
        let (buffer, transport) = buffer();
        for n in 0..50 {
            buffer.push(event(n));
        }

        let batches = transport.batches(Delivery::Async);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].events.len(), 50);
        assert_eq!(batches[0].events[0], event(0));
        assert_eq!(batches[0].events[49], event(49));
        assert_eq!(batches[0].session_id, "session_test");
        assert!(!buffer.timer_armed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_partial_batch() {
        let (buffer, transport) = buffer();
        buffer.push(event(1));
        assert!(buffer.timer_armed());

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert!(transport.deliveries().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let batches = transport.batches(Delivery::Async);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].events, vec![event(1)]);
        assert!(!buffer.timer_armed());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.deliveries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_flush_new_batch_early() {
        let (buffer, transport) = buffer();
        buffer.push(event(0));

        tokio::time::sleep(Duration::from_secs(4)).await;
        for n in 1..50 {
            buffer.push(event(n));
        }
        assert_eq!(transport.deliveries().len(), 1);

        // New timer armed at t=4s, due at t=9s
        buffer.push(event(50));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.deliveries().len(), 1);
        assert_eq!(buffer.pending_len(), 1);

        tokio::time::sleep(Duration::from_millis(3100)).await;
        let batches = transport.batches(Delivery::Async);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].events, vec![event(50)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_uses_teardown_path_and_closes() {
        let (buffer, transport) = buffer();
        for n in 0..3 {
            buffer.push(event(n));
        }

        assert_eq!(buffer.teardown(), 3);
        let torn = transport.batches(Delivery::Teardown);
        assert_eq!(torn.len(), 1);
        assert_eq!(torn[0].events.len(), 3);
        assert!(transport.batches(Delivery::Async).is_empty());
        assert!(buffer.is_closed());
        assert!(!buffer.timer_armed());

        buffer.push(event(4));
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(buffer.teardown(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_of_empty_buffer_sends_nothing() {
        let (buffer, transport) = buffer();
        assert_eq!(buffer.flush(), 0);
        assert_eq!(buffer.teardown(), 0);
        assert!(transport.deliveries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_signals_drive_flushes() {
        let (buffer, transport) = buffer();
        let (tx, rx) = lifecycle::channel();
        buffer.watch_lifecycle(rx);
        assert_eq!(buffer.subscription_count(), 1);

        buffer.push(event(1));
        buffer.push(event(2));
        tx.send(LifecycleSignal::Hidden).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.batches(Delivery::Async).len(), 1);
        assert!(!buffer.timer_armed());

        tx.send(LifecycleSignal::Visible).unwrap();
        buffer.push(event(3));
        tx.send(LifecycleSignal::Teardown).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let torn = transport.batches(Delivery::Teardown);
        assert_eq!(torn.len(), 1);
        assert_eq!(torn[0].events, vec![event(3)]);
        assert!(buffer.is_closed());
        assert_eq!(buffer.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_after_teardown_is_inert() {
        let (buffer, _transport) = buffer();
        buffer.teardown();
        let (_tx, rx) = lifecycle::channel();
        buffer.watch_lifecycle(rx);
        assert_eq!(buffer.subscription_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_lose_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        let config = RecorderConfig {
            batch_size: 7,
            ..RecorderConfig::default()
        };
        let buffer = BatchBuffer::with_session_id("s", config, transport.clone()).unwrap();

        let mut handles = Vec::new();
        for t in 0..8 {
            let buffer = buffer.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..25 {
                    buffer.push(event(t * 100 + n));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        buffer.teardown();

        let total: usize = transport
            .deliveries()
            .into_iter()
            .map(|(_, m)| match m {
                Message::Events(b) => b.events.len(),
                Message::Metadata(_) => 0,
            })
            .sum();
        assert_eq!(total, 200);
        assert!(transport
            .batches(Delivery::Async)
            .iter()
            .all(|b| b.events.len() == 7));
    }
}
