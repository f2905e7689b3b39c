use async_trait::async_trait;
use s3::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;

use super::error::StorageError;
use super::traits::{BoxReader, DynWriter, StorageBackend};

/// Remote object-store backend.
///
/// All transfers stream through the bucket client; nothing is buffered in
/// full. Unlike the filesystem backend, `rename` is a server-side copy
/// followed by a delete and is therefore not atomic: a crash between the two
/// calls leaves the source object behind. Content addressing makes the
/// resulting re-upload idempotent, so no repair pass is needed.
pub struct S3Backend {
    bucket: Box<Bucket>,
}

impl S3Backend {
    /// Connect to a bucket. An explicit `endpoint` selects a custom
    /// S3-compatible store (MinIO, Ceph) with path-style addressing.
    pub fn new(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = match endpoint {
            Some(endpoint) => Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.to_string(),
            },
            None => region
                .parse()
                .map_err(|_| StorageError::Remote(format!("unknown region '{region}'")))?,
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Remote(format!("bad credentials: {e}")))?;

        let mut bucket = Bucket::new(bucket, region, credentials).map_err(remote_err)?;
        if endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        Ok(Self { bucket })
    }
}

fn remote_err(e: S3Error) -> StorageError {
    StorageError::Remote(e.to_string())
}

fn is_missing(e: &S3Error) -> bool {
    matches!(e, S3Error::HttpFailWithBody(404, _))
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn upload(&self, key: &str, mut reader: BoxReader) -> Result<u64, StorageError> {
        let response = self
            .bucket
            .put_object_stream(&mut reader, key)
            .await
            .map_err(remote_err)?;

        Ok(response.uploaded_bytes() as u64)
    }

    async fn download(&self, key: &str, writer: &mut DynWriter) -> Result<(), StorageError> {
        match self.bucket.get_object_to_writer(key, writer).await {
            Ok(_status) => Ok(()),
            Err(e) if is_missing(&e) => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(remote_err(e)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        // Copy+delete; see the type-level note on atomicity.
        match self.bucket.copy_object_internal(from, to).await {
            Ok(_) => {}
            Err(e) if is_missing(&e) => return Err(StorageError::NotFound(from.to_string())),
            Err(e) => return Err(remote_err(e)),
        }

        if let Err(e) = self.bucket.delete_object(from).await {
            // The copy succeeded; an undeleted source is the documented
            // failure mode, not a failed promotion.
            tracing::warn!(from, to, error = %e, "rename left source object behind");
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        match self.bucket.delete_object(key).await {
            Ok(_) => Ok(true),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(remote_err(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.bucket.head_object(key).await {
            Ok(_) => Ok(true),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(remote_err(e)),
        }
    }
}
