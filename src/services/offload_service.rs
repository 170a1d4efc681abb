//! src/services/offload_service.rs
//!
//! OffloadService: the entry points the host calls for hooks, the batch
//! trigger and reads. Each call re-reads the settings singleton and builds
//! a fresh object store adapter from it, then hands both to the component
//! doing the actual work.

use crate::{
    models::{attachment::AttachmentRecord, settings::Settings, voucher::Voucher},
    services::{
        OffloadResult, batch,
        batch::{BATCH_EXCLUDED_TYPES, BatchReport},
        deletion,
        object_store::{ByteChunks, ObjectStoreAdapter, StoreConnector},
        records::AttachmentRepo,
        redirector::{self, ReadTarget},
        rewriter::{
            MigrationOutcome, ReferenceRewriter, SitePaths, SkipReason,
            UPLOAD_HOOK_EXCLUDED_TYPES,
        },
        voucher,
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct OffloadService {
    /// Host record store.
    pub repo: AttachmentRepo,

    /// Builds object store clients from the current settings.
    pub connector: Arc<dyn StoreConnector>,

    /// Host site directory holding not-yet-migrated files.
    pub site: SitePaths,
}

impl OffloadService {
    pub fn new(
        db: Arc<SqlitePool>,
        connector: Arc<dyn StoreConnector>,
        site: SitePaths,
    ) -> Self {
        Self {
            repo: AttachmentRepo::new(db),
            connector,
            site,
        }
    }

    async fn settings_and_adapter(&self) -> OffloadResult<(Settings, ObjectStoreAdapter)> {
        let settings = self.repo.load_settings().await?;
        let adapter = ObjectStoreAdapter::connect(self.connector.as_ref(), &settings).await?;
        Ok((settings, adapter))
    }

    /// Upload hook: offload a freshly created attachment.
    pub async fn on_file_created(&self, record: &AttachmentRecord) -> OffloadResult<MigrationOutcome> {
        if record
            .owner_type()
            .is_some_and(|t| UPLOAD_HOOK_EXCLUDED_TYPES.contains(&t))
        {
            debug!(record = %record.name, "owner type excluded from offload");
            return Ok(MigrationOutcome::Skipped {
                reason: SkipReason::ExcludedOwner,
            });
        }
        let (settings, adapter) = self.settings_and_adapter().await?;
        ReferenceRewriter::new(&self.repo, &adapter, &settings, &self.site)
            .migrate_one(record)
            .await
    }

    /// Batch trigger: offload every record still on local disk.
    pub async fn migrate_existing_files(&self) -> OffloadResult<BatchReport> {
        let (settings, adapter) = self.settings_and_adapter().await?;
        let rewriter = ReferenceRewriter::new(&self.repo, &adapter, &settings, &self.site);
        batch::migrate_all(&self.repo, &rewriter, &BATCH_EXCLUDED_TYPES).await
    }

    /// Redirect endpoint: presign `key`.
    pub async fn resolve_read(&self, key: Option<&str>) -> OffloadResult<ReadTarget> {
        if key.is_none_or(str::is_empty) {
            return Ok(ReadTarget::KeyMissing);
        }
        let (_, adapter) = self.settings_and_adapter().await?;
        redirector::resolve_read(&adapter, key).await
    }

    /// Raw bytes of the record named `logical_name`.
    pub async fn read_bytes(&self, logical_name: &str) -> OffloadResult<(String, ByteChunks)> {
        let (_, adapter) = self.settings_and_adapter().await?;
        redirector::read_bytes(&self.repo, &adapter, logical_name).await
    }

    /// Delete hook.
    pub async fn on_file_deleted(&self, record: &AttachmentRecord) -> OffloadResult<()> {
        let (_, adapter) = self.settings_and_adapter().await?;
        deletion::on_delete(&adapter, record).await
    }

    pub async fn upload_voucher_pdf(
        &self,
        voucher: &Voucher,
        pdf: &[u8],
        is_private: bool,
    ) -> OffloadResult<Option<String>> {
        let (settings, adapter) = self.settings_and_adapter().await?;
        voucher::upload_voucher_pdf(&adapter, &settings, voucher, pdf, is_private).await
    }

    pub async fn delete_voucher_pdf(&self, voucher: &Voucher) -> OffloadResult<()> {
        let (settings, adapter) = self.settings_and_adapter().await?;
        voucher::delete_voucher_pdf(&adapter, &settings, voucher).await
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::services::{
        object_store::memory::{MemoryConnector, MemoryObjectStore},
        records::test_support::{memory_repo, test_settings},
    };

    pub struct TestService {
        pub service: OffloadService,
        pub store: Arc<MemoryObjectStore>,
        pub _site_dir: tempfile::TempDir,
    }

    /// Service over an in-memory database and object store, with working
    /// credentials saved in the settings singleton.
    pub async fn test_service() -> TestService {
        let repo = memory_repo().await;
        repo.save_settings(&test_settings()).await.unwrap();
        let store = MemoryObjectStore::new();
        let site_dir = tempfile::tempdir().unwrap();
        let service = OffloadService {
            repo,
            connector: Arc::new(MemoryConnector(store.clone())),
            site: SitePaths::new(site_dir.path()),
        };
        TestService {
            service,
            store,
            _site_dir: site_dir,
        }
    }

    impl TestService {
        pub async fn add_local_file(&self, record: &AttachmentRecord, bytes: &[u8]) {
            self.service.repo.insert(record).await.unwrap();
            let path = self
                .service
                .site
                .local_path(record.reference(), record.is_private)
                .unwrap();
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(&path, bytes).await.unwrap();
        }
    }
}
