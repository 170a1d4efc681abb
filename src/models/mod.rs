//! Core data models for the attachment offload service.
//!
//! Attachment records and the settings singleton map to host database rows
//! via `sqlx::FromRow`; everything serializes as JSON via `serde` so hook
//! payloads can carry them directly.

pub mod attachment;
pub mod settings;
pub mod voucher;
