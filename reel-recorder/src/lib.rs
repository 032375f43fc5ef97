//! Client half of Reel: buffers capture events and ships them to the server.
//!
//! A [`Recorder`] wires a [`CaptureEngine`] into a [`BatchBuffer`], which
//! flushes through a [`Transport`] when the batch fills, when its timer
//! expires, or when the page is hidden or torn down.

pub mod buffer;
pub mod capture;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod recorder;
pub mod session_id;
pub mod transport;

pub use buffer::BatchBuffer;
pub use capture::{CaptureEngine, CaptureFeed, CaptureOptions, ChannelCapture, Disposer};
pub use config::RecorderConfig;
pub use error::RecorderError;
pub use lifecycle::{LifecycleSignal, LifecycleSubscription};
pub use recorder::{PageInfo, Recorder};
pub use transport::{Delivery, HttpTransport, MemoryTransport, Message, Transport};
