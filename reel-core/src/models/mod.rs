pub mod message;
pub mod session;

pub use message::{Ack, EventBatch, SessionMetadata, Viewport};
pub use session::{SessionDetail, SessionPage, SessionRecord, SessionSummary, PAGE_SIZE};
