use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufReader};

use super::error::StorageError;
use super::traits::{BoxReader, DynWriter, StorageBackend};

/// Filesystem-backed object storage.
///
/// Objects live under `{root}/{key}`; missing parent directories are created
/// on write. `rename` maps to `fs::rename`, which is atomic within one
/// filesystem, so a promoted object is never observable half-written.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    pub async fn new(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(StorageError::InvalidId(format!("bad object key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn upload(&self, key: &str, mut reader: BoxReader) -> Result<u64, StorageError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        let written = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&path).await;
                return Err(e.into());
            }
        };
        file.flush().await?;

        Ok(written)
    }

    async fn download(&self, key: &str, writer: &mut DynWriter) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        tokio::io::copy(&mut reader, writer).await?;
        writer.flush().await?;

        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let from_path = self.object_path(from)?;
        let to_path = self.object_path(to)?;

        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::rename(&from_path, &to_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(from.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }
}
