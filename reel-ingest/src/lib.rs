//! Server-side session store: session registration, append-consistent event
//! accumulation and paginated retrieval.

pub mod error;
pub mod locks;
pub mod store;

pub use error::StoreError;
pub use locks::SessionLocks;
pub use store::SessionStore;
