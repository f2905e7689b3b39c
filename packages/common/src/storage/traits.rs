use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Type alias for a borrowed async writer sink.
pub type DynWriter = dyn AsyncWrite + Unpin + Send;

/// Uniform object storage over a named key.
///
/// Keys are slash-separated relative paths (`{owner}/{digest}` for final
/// object keys, `tmp/{uuid}` for in-flight uploads). The gateway never sees
/// which implementation it talks to.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stream the reader's bytes into the object stored under `key`,
    /// replacing any existing object. Returns the number of bytes written.
    async fn upload(&self, key: &str, reader: BoxReader) -> Result<u64, StorageError>;

    /// Stream the object stored under `key` into the writer.
    async fn download(&self, key: &str, writer: &mut DynWriter) -> Result<(), StorageError>;

    /// Move the object at `from` to `to`.
    ///
    /// Promotion of a verified upload goes through this. The local backend
    /// renames atomically; the remote backend copies then deletes and can
    /// leave the source behind on a mid-operation crash.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Delete the object under `key`.
    ///
    /// Returns `true` if an object was deleted, `false` if none existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Check whether an object exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}
