//! Page lifecycle notifications delivered to the buffer.
//!
//! The host publishes [`LifecycleSignal`]s on a broadcast channel; the buffer
//! subscribes and keeps the returned [`LifecycleSubscription`] until teardown.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The page became hidden; pending events are flushed on the normal path.
    Hidden,
    Visible,
    /// The page is going away; pending events go out on the teardown path.
    Teardown,
}

pub fn channel() -> (
    broadcast::Sender<LifecycleSignal>,
    broadcast::Receiver<LifecycleSignal>,
) {
    broadcast::channel(CHANNEL_CAPACITY)
}

/// A running listener task. Aborted on [`cancel`](Self::cancel) or drop.
#[derive(Debug)]
pub struct LifecycleSubscription {
    handle: JoinHandle<()>,
}

impl LifecycleSubscription {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
