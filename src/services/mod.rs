//! Offload services: key generation, the object store adapter, the host
//! record repository and the operations built from them.

pub mod batch;
pub mod deletion;
pub mod keys;
pub mod object_store;
pub mod offload_service;
pub mod records;
pub mod redirector;
pub mod rewriter;
pub mod voucher;

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OffloadError {
    /// The store rejected an upload (auth, network, quota).
    #[error("upload of `{key}` failed: {reason}")]
    UploadFailure { key: String, reason: String },
    /// The store rejected a delete.
    #[error("delete of `{key}` denied: {reason}")]
    AccessDenied { key: String, reason: String },
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("attachment `{0}` not found")]
    RecordNotFound(String),
    #[error("presign failed: {0}")]
    Presign(String),
    #[error("object store error: {0}")]
    Transport(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type OffloadResult<T> = Result<T, OffloadError>;
