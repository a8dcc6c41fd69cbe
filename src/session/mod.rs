//! Live play and persistence.

pub mod live;
pub mod store;

pub use live::{LiveSession, RenderMode, SaveNotice, ViewSettings};
pub use store::{FileStore, MemoryStore, ReplayStore, StoreError};
