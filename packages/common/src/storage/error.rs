use std::fmt;

/// Errors that can occur during storage backend operations.
#[derive(Debug)]
pub enum StorageError {
    /// No object exists under the requested key.
    NotFound(String),
    /// An I/O error occurred.
    Io(std::io::Error),
    /// The provided content hash or storage id is invalid.
    InvalidId(String),
    /// The remote object store rejected or failed the request.
    Remote(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "object not found: {key}"),
            Self::Io(err) => write!(f, "storage IO error: {err}"),
            Self::InvalidId(msg) => write!(f, "invalid storage id: {msg}"),
            Self::Remote(msg) => write!(f, "remote store error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
