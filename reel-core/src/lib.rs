pub mod config;
#[cfg(feature = "db")]
pub mod db;
pub mod error;
pub mod models;

pub use config::ReelConfig;
pub use error::ReelError;
pub use models::{
    Ack, EventBatch, SessionDetail, SessionMetadata, SessionPage, SessionSummary, Viewport,
    PAGE_SIZE,
};
