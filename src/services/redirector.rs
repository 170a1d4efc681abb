//! Read path: presigned redirects for private references and direct byte
//! reads for programmatic consumers.

use crate::services::{
    OffloadError, OffloadResult,
    object_store::{ByteChunks, ObjectStoreAdapter, PresignedUrl},
    records::AttachmentRepo,
    rewriter::key_from_reference,
};
use tracing::debug;

/// Body returned when the redirect endpoint is called without a key.
pub const KEY_NOT_FOUND: &str = "Key not found.";

#[derive(Debug)]
pub enum ReadTarget {
    /// Redirect the caller here; the service is not in the data path.
    Redirect(PresignedUrl),
    /// No key was supplied.
    KeyMissing,
}

/// Presign a GET for `key` with the configured expiry.
pub async fn resolve_read(
    adapter: &ObjectStoreAdapter,
    key: Option<&str>,
) -> OffloadResult<ReadTarget> {
    let Some(key) = key.filter(|k| !k.is_empty()) else {
        return Ok(ReadTarget::KeyMissing);
    };
    let presigned = adapter.presign(key, adapter.presign_expiry()).await?;
    debug!(key, expires_at = %presigned.expires_at, "issued presigned url");
    Ok(ReadTarget::Redirect(presigned))
}

/// Stream the bytes of the record named `logical_name` (record id or display
/// name), returning its display name alongside.
pub async fn read_bytes(
    repo: &AttachmentRepo,
    adapter: &ObjectStoreAdapter,
    logical_name: &str,
) -> OffloadResult<(String, ByteChunks)> {
    let record = repo
        .fetch_by_name_or_file_name(logical_name)
        .await?
        .ok_or_else(|| OffloadError::RecordNotFound(logical_name.to_string()))?;

    let embedded = if record.is_private {
        key_from_reference(record.reference())
    } else {
        None
    };
    let key = embedded
        .or_else(|| record.object_key())
        .ok_or_else(|| OffloadError::ObjectNotFound(logical_name.to_string()))?
        .to_string();

    let body = adapter.get(&key).await?;
    Ok((record.file_name, body))
}
