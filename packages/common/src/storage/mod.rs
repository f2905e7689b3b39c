mod error;
mod id;
mod traits;

pub mod filesystem;
pub mod s3;

pub use error::StorageError;
pub use id::{ContentHash, StorageId};
pub use traits::{BoxReader, DynWriter, StorageBackend};
