//! Deletion hook: drop the object behind a deleted attachment record.

use crate::{
    models::attachment::AttachmentRecord,
    services::{OffloadResult, object_store::ObjectStoreAdapter},
};
use tracing::debug;

/// Delete the record's object when it has a key. Whether the store is
/// actually touched is governed by the adapter's delete-on-removal policy.
pub async fn on_delete(adapter: &ObjectStoreAdapter, record: &AttachmentRecord) -> OffloadResult<()> {
    match record.object_key() {
        Some(key) => adapter.delete(key).await,
        None => {
            debug!(record = %record.name, "no object key; nothing to delete");
            Ok(())
        }
    }
}
