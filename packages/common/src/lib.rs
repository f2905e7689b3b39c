pub mod duration;
pub mod storage;

pub use duration::parse_duration;
pub use storage::{BoxReader, ContentHash, StorageBackend, StorageError, StorageId};
