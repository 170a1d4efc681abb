//! Voucher PDF offload: rendered documents keyed by posting date.

use crate::{
    models::{settings::Settings, voucher::Voucher},
    services::{
        OffloadResult,
        keys::generate_voucher_key,
        object_store::{AccessClass, ObjectStoreAdapter},
        rewriter::upload_file,
    },
};
use tempfile::{Builder, NamedTempFile};
use tokio::{fs, io::AsyncWriteExt};
use tracing::info;

/// Write the rendered PDF to a named temp file. The file is removed when
/// the returned handle drops.
async fn write_temp_pdf(file_name: &str, bytes: &[u8]) -> OffloadResult<NamedTempFile> {
    let temp = Builder::new().suffix(file_name).tempfile()?;
    let mut file = fs::File::from_std(temp.reopen()?);
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(temp)
}

/// Object key for a voucher's PDF under the current settings.
pub fn voucher_pdf_key(settings: &Settings, voucher: &Voucher) -> String {
    generate_voucher_key(
        &voucher.voucher_type,
        voucher.posting_date,
        settings.root_folder(),
        &voucher.pdf_file_name(),
    )
}

/// Upload a voucher's rendered PDF and return its reference.
///
/// Returns `None` without touching the store when no credentials are
/// configured. The temp file is removed on every path.
pub async fn upload_voucher_pdf(
    adapter: &ObjectStoreAdapter,
    settings: &Settings,
    voucher: &Voucher,
    pdf: &[u8],
    is_private: bool,
) -> OffloadResult<Option<String>> {
    if !settings.has_credentials() {
        return Ok(None);
    }

    let file_name = voucher.pdf_file_name();
    let temp = write_temp_pdf(&file_name, pdf).await?;
    let key = voucher_pdf_key(settings, voucher);
    let reference = upload_file(
        adapter,
        temp.path(),
        &file_name,
        &key,
        AccessClass::from_is_private(is_private),
    )
    .await?;

    info!(voucher = %voucher.name, key = %key, "voucher pdf offloaded");
    Ok(Some(reference))
}

/// Delete a voucher's PDF, subject to the delete-on-removal policy.
pub async fn delete_voucher_pdf(
    adapter: &ObjectStoreAdapter,
    settings: &Settings,
    voucher: &Voucher,
) -> OffloadResult<()> {
    adapter.delete(&voucher_pdf_key(settings, voucher)).await
}
