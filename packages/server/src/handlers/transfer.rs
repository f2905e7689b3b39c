use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use common::{BoxReader, StorageBackend, StorageError, StorageId};
use futures::TryStreamExt;
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, Set};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::entity::storage_object;
use crate::error::{AppError, ErrorBody};
use crate::state::AppState;
use crate::utils::disposition;
use crate::utils::token::{self, TransferMethod};

/// AsyncRead adapter that feeds every byte it passes through into a sha256
/// accumulator and a byte counter, shared with the caller.
///
/// This is what lets the gateway hand the request body straight to the
/// backend while still verifying size and digest: nothing is ever buffered
/// beyond the read chunk in flight.
struct DigestReader<R> {
    inner: R,
    hasher: Arc<Mutex<Sha256>>,
    count: Arc<AtomicU64>,
}

impl<R: AsyncRead + Unpin> AsyncRead for DigestReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let filled_before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let chunk = &buf.filled()[filled_before..];
                if !chunk.is_empty() {
                    this.hasher.lock().expect("hasher lock").update(chunk);
                    this.count.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

fn op_timeout(state: &AppState) -> Duration {
    Duration::from_secs(state.config.storage.op_timeout_secs)
}

/// Run one backend call under the configured per-op timeout so a stalled
/// backend cannot pin a gateway worker indefinitely.
async fn bounded<T>(
    timeout: Duration,
    op: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            "backend operation timed out",
        ))),
    }
}

async fn discard_temp(backend: &dyn StorageBackend, timeout: Duration, temp_key: &str) {
    if let Err(e) = bounded(timeout, backend.delete(temp_key)).await {
        error!(temp_key, "failed to discard temp upload artifact: {e}");
    }
}

#[utoipa::path(
    put,
    path = "/objects/{token}",
    tag = "Object Transfer",
    operation_id = "uploadObject",
    summary = "Upload an object through a capability token",
    description = "Streams the raw request body into the object named by the token's \
        audience. The body must be exactly `size` bytes and hash to the declared sha256; \
        anything else discards the upload without exposing a partial object. Re-uploading \
        existing content is idempotent.",
    params(("token" = String, Path, description = "Signed capability token (PUT)")),
    request_body(content_type = "application/octet-stream", description = "Raw object bytes"),
    responses(
        (status = 200, description = "Object stored and promoted"),
        (status = 400, description = "Size or digest mismatch (INTEGRITY_ERROR), missing digest (VALIDATION_ERROR)", body = ErrorBody),
        (status = 403, description = "Invalid token or wrong method (TOKEN_INVALID)", body = ErrorBody),
        (status = 500, description = "Backend failure (STORAGE_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, body), fields(token_len = token.len()))]
pub async fn upload_object(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Body,
) -> Result<StatusCode, AppError> {
    let claims = token::verify(&state.config.auth.token_secret, &token)
        .map_err(|_| AppError::TokenInvalid)?;

    if claims.method != TransferMethod::Put {
        return Err(AppError::TokenInvalid);
    }
    if claims.sha.is_empty() {
        return Err(AppError::Validation("Token carries no expected digest".into()));
    }
    if claims.size < 0 || claims.size as u64 > state.config.storage.max_object_size {
        return Err(AppError::Validation(format!(
            "Declared size {} outside accepted range",
            claims.size
        )));
    }

    let storage_id = StorageId::parse(&claims.aud).map_err(|_| AppError::TokenInvalid)?;
    let final_key = storage_id.key();
    let temp_key = format!("tmp/{}", Uuid::new_v4());
    let timeout = op_timeout(&state);

    let hasher = Arc::new(Mutex::new(Sha256::new()));
    let count = Arc::new(AtomicU64::new(0));

    let body_reader = StreamReader::new(
        body.into_data_stream()
            .map_err(|e| io::Error::other(format!("body read error: {e}"))),
    );
    let reader: BoxReader = Box::new(DigestReader {
        // One byte past the declared size: the body must be exactly `size`
        // bytes, and a longer one has to surface as a count mismatch rather
        // than be silently truncated.
        inner: body_reader.take(claims.size as u64 + 1),
        hasher: hasher.clone(),
        count: count.clone(),
    });

    // Everything between temp upload and promotion: any failure in this
    // block discards the temp artifact exactly once and the final key is
    // never touched.
    let verify_and_promote = async {
        bounded(timeout, state.backend.upload(&temp_key, reader)).await?;

        let received = count.load(Ordering::Relaxed);
        if received > claims.size as u64 {
            return Err(AppError::Integrity(format!(
                "body exceeds the declared size of {} bytes",
                claims.size
            )));
        }
        if received < claims.size as u64 {
            return Err(AppError::Integrity(format!(
                "received {received} bytes, token declared {}",
                claims.size
            )));
        }

        let digest = {
            let mut guard = hasher.lock().expect("hasher lock");
            hex::encode(std::mem::take(&mut *guard).finalize())
        };
        if digest != claims.sha.to_lowercase() {
            return Err(AppError::Integrity("digest mismatch: upload discarded".into()));
        }

        bounded(timeout, state.backend.rename(&temp_key, &final_key)).await?;
        Ok(digest)
    };

    let digest = match verify_and_promote.await {
        Ok(digest) => digest,
        Err(e) => {
            discard_temp(&*state.backend, timeout, &temp_key).await;
            return Err(e);
        }
    };

    let mime_type = mime_guess::from_path(&claims.disposition_name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let object = storage_object::ActiveModel {
        storage_id: Set(storage_id.to_string()),
        digest: Set(digest),
        owner: Set(storage_id.owner().to_string()),
        name: Set(claims.disposition_name.clone()),
        size: Set(claims.size),
        mime_type: Set(mime_type),
        garbage: Set(false),
        garbage_removal_at: Set(None),
    };
    // Re-upload of known content revives a garbage-flagged object.
    storage_object::Entity::insert(object)
        .on_conflict(
            OnConflict::column(storage_object::Column::StorageId)
                .update_columns([
                    storage_object::Column::Name,
                    storage_object::Column::Garbage,
                    storage_object::Column::GarbageRemovalAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&state.db)
        .await?;

    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/objects/{token}",
    tag = "Object Transfer",
    operation_id = "downloadObject",
    summary = "Download an object through a capability token",
    description = "Streams exactly `size` bytes of the object named by the token's \
        audience, with a Content-Disposition attachment header built from the token's \
        display name.",
    params(("token" = String, Path, description = "Signed capability token (GET)")),
    responses(
        (status = 200, description = "Object content"),
        (status = 403, description = "Invalid token or wrong method (TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Object not stored (NOT_FOUND)", body = ErrorBody),
        (status = 500, description = "Backend failure (STORAGE_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(token_len = token.len()))]
pub async fn download_object(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let claims = token::verify(&state.config.auth.token_secret, &token)
        .map_err(|_| AppError::TokenInvalid)?;

    if claims.method != TransferMethod::Get {
        return Err(AppError::TokenInvalid);
    }

    let storage_id = StorageId::parse(&claims.aud).map_err(|_| AppError::TokenInvalid)?;
    let key = storage_id.key();
    let timeout = op_timeout(&state);

    if !bounded(timeout, state.backend.exists(&key)).await? {
        return Err(AppError::NotFound(format!(
            "No object stored under '{storage_id}'"
        )));
    }

    let (mut writer, reader) = tokio::io::duplex(64 * 1024);

    let backend = state.backend.clone();
    let stream_key = key.clone();
    tokio::spawn(async move {
        match tokio::time::timeout(timeout, backend.download(&stream_key, &mut writer)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(key = stream_key, "download stream failed: {e}"),
            Err(_) => error!(key = stream_key, "download stream timed out"),
        }
        // Dropping the writer ends the response stream.
    });

    let body = Body::from_stream(ReaderStream::new(reader.take(claims.size as u64)));

    let mime_type = mime_guess::from_path(&claims.disposition_name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CONTENT_LENGTH, claims.size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            disposition::attachment_value(&claims.disposition_name),
        )
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))?;

    Ok(response)
}
