//! Reference rewriting: move a locally stored attachment into the object
//! store and point its record at the new location.
//!
//! A record is committed as migrated only after its object was uploaded, so
//! a crash in between leaves an orphaned object rather than a dangling
//! reference. The local copy is removed only after a successful commit;
//! failing to remove it is logged and otherwise ignored.

use crate::{
    models::{attachment::AttachmentRecord, settings::Settings},
    services::{
        OffloadResult,
        keys::{self, PathSource},
        object_store::{AccessClass, ObjectStoreAdapter},
        records::{AttachmentRepo, CommitOutcome},
    },
};
use serde::Serialize;
use std::{
    io::{self, ErrorKind},
    path::{Component, Path, PathBuf},
};
use tokio::{fs, io::AsyncReadExt};
use tracing::{debug, info, warn};

/// Endpoint that turns `?key=` into a presigned redirect.
pub const REDIRECT_ENDPOINT: &str = "/api/method/attachments.generate_file";

/// Owner types the upload hook leaves on local disk.
pub const UPLOAD_HOOK_EXCLUDED_TYPES: [&str; 3] =
    ["Data Import", "Prepared Report", "Digital Signature Settings"];

const SNIFF_LEN: usize = 8192;

/// Whether `reference` already addresses the object store, either through
/// the redirect endpoint or as a direct `https://` object URL.
pub fn is_object_store_reference(reference: &str) -> bool {
    reference.starts_with("https://")
        || reference
            .strip_prefix(REDIRECT_ENDPOINT)
            .is_some_and(|rest| rest.starts_with('?'))
}

/// Logical reference for a private object.
pub fn private_reference(key: &str) -> String {
    format!("{}?key={}", REDIRECT_ENDPOINT, key)
}

/// The object key embedded in a redirect-endpoint reference.
pub fn key_from_reference(reference: &str) -> Option<&str> {
    reference
        .strip_prefix(REDIRECT_ENDPOINT)
        .and_then(|rest| rest.strip_prefix("?key="))
        .filter(|key| !key.is_empty())
}

/// Reference a record should carry once `key` is uploaded with `access`.
pub fn reference_for(adapter: &ObjectStoreAdapter, key: &str, access: AccessClass) -> String {
    match access {
        AccessClass::Private => private_reference(key),
        AccessClass::Public => adapter.public_url(key),
    }
}

/// Where the host keeps attachment files on disk.
#[derive(Debug, Clone)]
pub struct SitePaths {
    root: PathBuf,
}

impl SitePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a local reference: public files live under `{site}/public`,
    /// private references already carry their `/private/...` prefix.
    pub fn local_path(&self, reference: &str, is_private: bool) -> io::Result<PathBuf> {
        let relative = Path::new(reference.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("reference `{}` escapes the site directory", reference),
            ));
        }
        let base = if is_private {
            self.root.clone()
        } else {
            self.root.join("public")
        };
        Ok(base.join(relative))
    }
}

/// Why a record was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoReference,
    AlreadyOffloaded,
    CredentialsAbsent,
    ExcludedOwner,
    RecordMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    Migrated { reference: String, key: String },
    Skipped { reason: SkipReason },
}

/// Sniff the MIME type from the file's leading bytes, ignoring its name.
pub async fn detect_content_type(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut file).take(SNIFF_LEN as u64).read_to_end(&mut head).await?;

    if let Some(kind) = infer::get(&head) {
        return Ok(kind.mime_type().to_string());
    }
    let is_text = match std::str::from_utf8(&head) {
        Ok(_) => true,
        // A multi-byte character cut off by the sniff window is still text.
        Err(err) => err.error_len().is_none() && head.len() == SNIFF_LEN,
    };
    Ok(if is_text {
        "text/plain".to_string()
    } else {
        "application/octet-stream".to_string()
    })
}

/// Upload `path` under `key` and return the reference for it.
pub async fn upload_file(
    adapter: &ObjectStoreAdapter,
    path: &Path,
    file_name: &str,
    key: &str,
    access: AccessClass,
) -> OffloadResult<String> {
    let content_type = detect_content_type(path).await?;
    adapter.put(path, key, &content_type, access, file_name).await?;
    Ok(reference_for(adapter, key, access))
}

/// Migrates single attachment records.
pub struct ReferenceRewriter<'a> {
    repo: &'a AttachmentRepo,
    adapter: &'a ObjectStoreAdapter,
    settings: &'a Settings,
    site: &'a SitePaths,
}

impl<'a> ReferenceRewriter<'a> {
    pub fn new(
        repo: &'a AttachmentRepo,
        adapter: &'a ObjectStoreAdapter,
        settings: &'a Settings,
        site: &'a SitePaths,
    ) -> Self {
        Self {
            repo,
            adapter,
            settings,
            site,
        }
    }

    /// Move one record's file into the object store.
    ///
    /// Already-offloaded records and a missing credential pair are skips,
    /// not errors. An upload failure leaves the record and its local file
    /// untouched.
    pub async fn migrate_one(&self, record: &AttachmentRecord) -> OffloadResult<MigrationOutcome> {
        let reference = record.reference();
        if reference.is_empty() {
            return Ok(MigrationOutcome::Skipped {
                reason: SkipReason::NoReference,
            });
        }
        if is_object_store_reference(reference) {
            debug!(record = %record.name, "already offloaded");
            return Ok(MigrationOutcome::Skipped {
                reason: SkipReason::AlreadyOffloaded,
            });
        }
        if !self.settings.has_credentials() {
            debug!(record = %record.name, "no credentials configured; offload disabled");
            return Ok(MigrationOutcome::Skipped {
                reason: SkipReason::CredentialsAbsent,
            });
        }

        let local_path = self.site.local_path(reference, record.is_private)?;
        let access = AccessClass::from_is_private(record.is_private);
        let key = self.key_for(record).await;

        let new_reference =
            upload_file(self.adapter, &local_path, &record.file_name, &key, access).await?;

        match self
            .repo
            .commit_migration(&record.name, &new_reference, &key)
            .await?
        {
            CommitOutcome::Committed => {}
            CommitOutcome::RecordMissing => {
                warn!(record = %record.name, key = %key, "record vanished before commit; object orphaned");
                return Ok(MigrationOutcome::Skipped {
                    reason: SkipReason::RecordMissing,
                });
            }
            CommitOutcome::KeyAlreadyAssigned => {
                warn!(record = %record.name, key = %key, "record already has an object key; object orphaned");
                return Ok(MigrationOutcome::Skipped {
                    reason: SkipReason::AlreadyOffloaded,
                });
            }
        }
        info!(record = %record.name, key = %key, "attachment offloaded");

        remove_local_copy(&local_path).await;

        Ok(MigrationOutcome::Migrated {
            reference: new_reference,
            key,
        })
    }

    async fn key_for(&self, record: &AttachmentRecord) -> String {
        let override_path = self.owner_override(record).await;
        let source = PathSource::resolve(
            override_path.as_deref(),
            self.settings.root_folder(),
            record.owner_type(),
        );
        keys::generate_key(source, &record.file_name)
    }

    /// Folder override declared by the owning entity. Lookup failures fall
    /// back to the dated layout.
    async fn owner_override(&self, record: &AttachmentRecord) -> Option<String> {
        let (owner_type, owner_name) = (record.owner_type()?, record.owner_name()?);
        match self.repo.owner_folder_path(owner_type, owner_name).await {
            Ok(path) => path,
            Err(err) => {
                warn!(
                    record = %record.name,
                    owner_type,
                    owner_name,
                    error = %err,
                    "owner folder lookup failed; using dated key"
                );
                None
            }
        }
    }
}

async fn remove_local_copy(path: &Path) {
    match fs::remove_file(path).await {
        Ok(_) => debug!("removed local copy {}", path.display()),
        Err(err) => warn!("could not remove local copy {}: {}", path.display(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        OffloadError,
        object_store::memory::MemoryObjectStore,
        records::{ATTACHMENTS_FOLDER, test_support::*},
    };
    use std::sync::Arc;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R'];

    struct Fixture {
        _site_dir: tempfile::TempDir,
        site: SitePaths,
        repo: AttachmentRepo,
        store: Arc<MemoryObjectStore>,
        adapter: ObjectStoreAdapter,
    }

    impl Fixture {
        async fn new(settings: &Settings) -> Self {
            let site_dir = tempfile::tempdir().unwrap();
            let site = SitePaths::new(site_dir.path());
            let store = MemoryObjectStore::new();
            let adapter = ObjectStoreAdapter::with_client(store.clone(), settings);
            Self {
                _site_dir: site_dir,
                site,
                repo: memory_repo().await,
                store,
                adapter,
            }
        }

        async fn write_local(&self, reference: &str, is_private: bool, bytes: &[u8]) -> PathBuf {
            let path = self.site.local_path(reference, is_private).unwrap();
            fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            fs::write(&path, bytes).await.unwrap();
            path
        }
    }

    #[test]
    fn recognises_object_store_references() {
        assert!(is_object_store_reference(&private_reference("a/b.txt")));
        assert!(is_object_store_reference("https://s3.us-east-1.amazonaws.com/files/a.txt"));
        assert!(!is_object_store_reference("/files/a.txt"));
        assert!(!is_object_store_reference("/private/files/a.txt"));
        assert!(!is_object_store_reference("/api/method/attachments.generate_filex"));
        assert!(!is_object_store_reference("http://insecure/a.txt"));
    }

    #[test]
    fn extracts_key_from_private_reference() {
        assert_eq!(key_from_reference(&private_reference("x/y_z.pdf")), Some("x/y_z.pdf"));
        assert_eq!(key_from_reference("/files/z.pdf"), None);
        assert_eq!(key_from_reference(&private_reference("")), None);
    }

    #[test]
    fn local_paths_split_public_and_private_roots() {
        let site = SitePaths::new("/srv/site");
        assert_eq!(
            site.local_path("/files/a.txt", false).unwrap(),
            PathBuf::from("/srv/site/public/files/a.txt")
        );
        assert_eq!(
            site.local_path("/private/files/a.txt", true).unwrap(),
            PathBuf::from("/srv/site/private/files/a.txt")
        );
        assert!(site.local_path("/files/../../etc/passwd", false).is_err());
    }

    #[tokio::test]
    async fn content_type_comes_from_bytes_not_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mislabeled = dir.path().join("photo.txt");
        fs::write(&mislabeled, PNG_HEADER).await.unwrap();
        assert_eq!(detect_content_type(&mislabeled).await.unwrap(), "image/png");

        let text = dir.path().join("notes.bin");
        fs::write(&text, "plain words").await.unwrap();
        assert_eq!(detect_content_type(&text).await.unwrap(), "text/plain");

        let binary = dir.path().join("blob.pdf");
        fs::write(&binary, b"\x13\x37\xc0\xde\x80\x80").await.unwrap();
        assert_eq!(detect_content_type(&binary).await.unwrap(), "application/octet-stream");
    }

    #[tokio::test]
    async fn private_file_is_uploaded_and_record_rewritten() {
        let settings = test_settings();
        let fx = Fixture::new(&settings).await;
        let record = record("F-1", "Invoice #1.pdf", "/private/files/Invoice #1.pdf", true);
        fx.repo.insert(&record).await.unwrap();
        let local = fx.write_local(record.reference(), true, b"%PDF-1.7 invoice").await;

        let rewriter = ReferenceRewriter::new(&fx.repo, &fx.adapter, &settings, &fx.site);
        let outcome = rewriter.migrate_one(&record).await.unwrap();

        let MigrationOutcome::Migrated { reference, key } = outcome else {
            panic!("expected migration");
        };
        assert!(key.starts_with("attach/"), "{}", key);
        assert!(key.ends_with("_Invoice_1.pdf"), "{}", key);
        assert_eq!(reference, format!("{}?key={}", REDIRECT_ENDPOINT, key));

        let stored = fx.store.object(&key).unwrap();
        assert_eq!(&stored.bytes[..], b"%PDF-1.7 invoice");
        assert_eq!(stored.content_type, "application/pdf");
        assert_eq!(stored.access, AccessClass::Private);
        assert_eq!(stored.metadata.get("file_name").map(String::as_str), Some("Invoice #1.pdf"));

        let updated = fx.repo.fetch("F-1").await.unwrap().unwrap();
        assert_eq!(updated.reference(), reference);
        assert_eq!(updated.object_key(), Some(key.as_str()));
        assert_eq!(updated.folder.as_deref(), Some(ATTACHMENTS_FOLDER));
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn public_file_gets_direct_url() {
        let settings = test_settings();
        let fx = Fixture::new(&settings).await;
        let record = record("F-2", "logo.png", "/files/logo.png", false);
        fx.repo.insert(&record).await.unwrap();
        fx.write_local(record.reference(), false, PNG_HEADER).await;

        let rewriter = ReferenceRewriter::new(&fx.repo, &fx.adapter, &settings, &fx.site);
        let MigrationOutcome::Migrated { reference, key } = rewriter.migrate_one(&record).await.unwrap() else {
            panic!("expected migration");
        };

        assert_eq!(reference, format!("https://s3.us-east-1.amazonaws.com/files/{}", key));
        let stored = fx.store.object(&key).unwrap();
        assert_eq!(stored.access, AccessClass::Public);
        assert!(!stored.metadata.contains_key("file_name"));
    }

    #[tokio::test]
    async fn already_offloaded_record_is_left_alone() {
        let settings = test_settings();
        let fx = Fixture::new(&settings).await;
        let mut record = record("F-3", "a.txt", &private_reference("attach/2024/01/01/ABCDEFGH_a.txt"), true);
        record.content_hash = Some("attach/2024/01/01/ABCDEFGH_a.txt".into());
        fx.repo.insert(&record).await.unwrap();

        let rewriter = ReferenceRewriter::new(&fx.repo, &fx.adapter, &settings, &fx.site);
        let outcome = rewriter.migrate_one(&record).await.unwrap();

        assert_eq!(
            outcome,
            MigrationOutcome::Skipped {
                reason: SkipReason::AlreadyOffloaded
            }
        );
        assert!(fx.store.put_calls().is_empty());
        assert_eq!(fx.repo.fetch("F-3").await.unwrap().unwrap(), record);
    }

    #[tokio::test]
    async fn missing_credentials_disable_offload() {
        let settings = Settings {
            aws_secret: None,
            ..test_settings()
        };
        let fx = Fixture::new(&settings).await;
        let record = record("F-4", "a.txt", "/files/a.txt", false);
        fx.repo.insert(&record).await.unwrap();
        let local = fx.write_local(record.reference(), false, b"a").await;

        let rewriter = ReferenceRewriter::new(&fx.repo, &fx.adapter, &settings, &fx.site);
        let outcome = rewriter.migrate_one(&record).await.unwrap();

        assert_eq!(
            outcome,
            MigrationOutcome::Skipped {
                reason: SkipReason::CredentialsAbsent
            }
        );
        assert!(fx.store.put_calls().is_empty());
        assert!(local.exists());
    }

    #[tokio::test]
    async fn upload_failure_leaves_record_and_file() {
        let settings = test_settings();
        let fx = Fixture::new(&settings).await;
        fx.store.fail_uploads_containing("_broken.txt");
        let record = record("F-5", "broken.txt", "/files/broken.txt", false);
        fx.repo.insert(&record).await.unwrap();
        let local = fx.write_local(record.reference(), false, b"x").await;

        let rewriter = ReferenceRewriter::new(&fx.repo, &fx.adapter, &settings, &fx.site);
        let err = rewriter.migrate_one(&record).await.unwrap_err();

        assert!(matches!(err, OffloadError::UploadFailure { .. }), "{err}");
        assert_eq!(fx.repo.fetch("F-5").await.unwrap().unwrap(), record);
        assert!(local.exists());
    }

    #[tokio::test]
    async fn vanished_record_keeps_local_file() {
        let settings = test_settings();
        let fx = Fixture::new(&settings).await;
        let record = record("F-8", "gone.txt", "/files/gone.txt", false);
        let local = fx.write_local(record.reference(), false, b"gone").await;

        let rewriter = ReferenceRewriter::new(&fx.repo, &fx.adapter, &settings, &fx.site);
        let outcome = rewriter.migrate_one(&record).await.unwrap();

        assert_eq!(
            outcome,
            MigrationOutcome::Skipped {
                reason: SkipReason::RecordMissing
            }
        );
        assert!(local.exists());
        assert_eq!(fx.store.keys().len(), 1);
    }

    #[tokio::test]
    async fn stale_snapshot_does_not_replace_stored_key() {
        let settings = test_settings();
        let fx = Fixture::new(&settings).await;
        let snapshot = record("F-10", "dup.txt", "/files/dup.txt", false);
        let mut stored = snapshot.clone();
        stored.file_url = Some(private_reference("attach/2024/01/01/AAAAAAAA_dup.txt"));
        stored.content_hash = Some("attach/2024/01/01/AAAAAAAA_dup.txt".into());
        fx.repo.insert(&stored).await.unwrap();
        let local = fx.write_local(snapshot.reference(), false, b"dup").await;

        let rewriter = ReferenceRewriter::new(&fx.repo, &fx.adapter, &settings, &fx.site);
        let outcome = rewriter.migrate_one(&snapshot).await.unwrap();

        assert_eq!(
            outcome,
            MigrationOutcome::Skipped {
                reason: SkipReason::AlreadyOffloaded
            }
        );
        assert_eq!(fx.repo.fetch("F-10").await.unwrap().unwrap(), stored);
        assert!(local.exists());
    }

    #[tokio::test]
    async fn owner_override_path_wins() {
        let settings = test_settings();
        let fx = Fixture::new(&settings).await;
        fx.repo
            .set_owner_folder_path("Customer", "ACME", "/customers/acme/")
            .await
            .unwrap();
        let mut record = record("F-6", "contract.pdf", "/files/contract.pdf", false);
        record.attached_to_doctype = Some("Customer".into());
        record.attached_to_name = Some("ACME".into());
        fx.repo.insert(&record).await.unwrap();
        fx.write_local(record.reference(), false, b"%PDF-1.4").await;

        let rewriter = ReferenceRewriter::new(&fx.repo, &fx.adapter, &settings, &fx.site);
        let MigrationOutcome::Migrated { key, .. } = rewriter.migrate_one(&record).await.unwrap() else {
            panic!("expected migration");
        };
        assert!(key.starts_with("customers/acme/"), "{}", key);
        assert!(key.ends_with("_contract.pdf"));
    }

    #[tokio::test]
    async fn owner_lookup_failure_falls_back_to_dated_key() {
        let settings = test_settings();
        let fx = Fixture::new(&settings).await;
        let mut record = record("F-7", "memo.txt", "/files/memo.txt", false);
        record.attached_to_doctype = Some("Task".into());
        record.attached_to_name = Some("T-1".into());
        fx.repo.insert(&record).await.unwrap();
        fx.write_local(record.reference(), false, b"memo").await;
        sqlx::query("DROP TABLE owner_folder_paths")
            .execute(fx.repo.pool())
            .await
            .unwrap();

        let rewriter = ReferenceRewriter::new(&fx.repo, &fx.adapter, &settings, &fx.site);
        let MigrationOutcome::Migrated { key, .. } = rewriter.migrate_one(&record).await.unwrap() else {
            panic!("expected migration");
        };
        let segments: Vec<&str> = key.split('/').collect();
        assert_eq!(segments[0], "attach");
        assert_eq!(segments[4], "Task");
        assert!(segments[5].ends_with("_memo.txt"));
    }
}
