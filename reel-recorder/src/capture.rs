//! Seam to the capture engine that observes the page and produces events.
//!
//! Events are opaque JSON records; nothing here looks inside them.

use std::sync::{Arc, Mutex};

use serde_json::Value;

pub type EventCallback = Box<dyn Fn(Value) + Send + Sync>;

type SharedCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Privacy markings the engine honours: elements carrying `block_class` are
/// not recorded, elements carrying `ignore_class` have their input ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub block_class: String,
    pub ignore_class: String,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            block_class: "rr-block".to_string(),
            ignore_class: "rr-ignore".to_string(),
        }
    }
}

pub trait CaptureEngine: Send + Sync {
    /// Start delivering events to `callback` until the returned [`Disposer`]
    /// is disposed or dropped.
    fn on_event(&self, options: &CaptureOptions, callback: EventCallback) -> Disposer;
}

/// Stops a capture registration. Runs at most once.
#[must_use = "dropping a Disposer stops the capture immediately"]
pub struct Disposer {
    dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposer {
    pub fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    pub fn dispose(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

#[derive(Default)]
struct Registration {
    callback: Option<SharedCallback>,
    options: Option<CaptureOptions>,
}

/// Engine for hosts that produce events themselves: events pushed through
/// the paired [`CaptureFeed`] reach whichever callback is registered.
#[derive(Clone, Default)]
pub struct ChannelCapture {
    slot: Arc<Mutex<Registration>>,
}

impl ChannelCapture {
    pub fn new() -> (Self, CaptureFeed) {
        let capture = Self::default();
        let feed = CaptureFeed {
            slot: capture.slot.clone(),
        };
        (capture, feed)
    }
}

impl CaptureEngine for ChannelCapture {
    fn on_event(&self, options: &CaptureOptions, callback: EventCallback) -> Disposer {
        {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.callback = Some(Arc::from(callback));
            slot.options = Some(options.clone());
        }

        let slot = self.slot.clone();
        Disposer::new(move || {
            let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.callback = None;
            slot.options = None;
        })
    }
}

#[derive(Clone)]
pub struct CaptureFeed {
    slot: Arc<Mutex<Registration>>,
}

impl CaptureFeed {
    /// Hand one event to the registered callback. Returns false when nothing
    /// is registered and the event was dropped.
    pub fn emit(&self, event: Value) -> bool {
        // Call outside the lock so the callback may re-enter the feed
        let callback = self
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .callback
            .clone();
        match callback {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        }
    }

    /// Options of the current registration, so the host can apply the
    /// privacy markings while producing events.
    pub fn options(&self) -> Option<CaptureOptions> {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .options
            .clone()
    }
}
