//! Host record store: attachment rows, owning-entity folder overrides and
//! the settings singleton, all in the host's SQLite database.

use crate::{
    models::{attachment::AttachmentRecord, settings::Settings},
    services::OffloadResult,
};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::debug;

/// Folder migrated attachments are filed under in the host's file tree.
pub const ATTACHMENTS_FOLDER: &str = "Home/Attachments";

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const RECORD_COLUMNS: &str = "name, file_name, file_url, is_private, attached_to_doctype, \
     attached_to_name, content_hash, folder";

/// Result of committing a migrated record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The record was deleted after it was read.
    RecordMissing,
    /// Another writer assigned an object key first.
    KeyAlreadyAssigned,
}

/// Typed access to the host tables the offload layer reads and writes.
#[derive(Clone)]
pub struct AttachmentRepo {
    db: Arc<SqlitePool>,
}

impl AttachmentRepo {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Apply the embedded schema statement by statement.
    pub async fn migrate(&self) -> OffloadResult<usize> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(statements.len())
    }

    /// Load the settings singleton; an empty row when none was stored yet.
    pub async fn load_settings(&self) -> OffloadResult<Settings> {
        let settings = sqlx::query_as::<_, Settings>(
            "SELECT aws_key, aws_secret, region_name, bucket_name, folder_name, endpoint_url,
                    delete_file_from_cloud, signed_url_expiry_time
             FROM offload_settings WHERE id = 1",
        )
        .fetch_optional(&*self.db)
        .await?;
        Ok(settings.unwrap_or_default())
    }

    pub async fn fetch(&self, name: &str) -> OffloadResult<Option<AttachmentRecord>> {
        let record = sqlx::query_as::<_, AttachmentRecord>(&format!(
            "SELECT {} FROM files WHERE name = ?",
            RECORD_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    /// Look a record up by its id or, failing that, its display name.
    pub async fn fetch_by_name_or_file_name(
        &self,
        name: &str,
    ) -> OffloadResult<Option<AttachmentRecord>> {
        let record = sqlx::query_as::<_, AttachmentRecord>(&format!(
            "SELECT {} FROM files WHERE name = ?1 OR file_name = ?1
             ORDER BY CASE WHEN name = ?1 THEN 0 ELSE 1 END, created_at
             LIMIT 1",
            RECORD_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    /// Records with a reference whose owner type is not in `exclude_types`.
    /// Unattached records are always included.
    pub async fn list_with_reference(
        &self,
        exclude_types: &[&str],
    ) -> OffloadResult<Vec<AttachmentRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM files WHERE file_url IS NOT NULL AND file_url != ''",
            RECORD_COLUMNS
        ));
        if !exclude_types.is_empty() {
            builder.push(" AND COALESCE(attached_to_doctype, '') NOT IN (");
            let mut separated = builder.separated(", ");
            for owner_type in exclude_types {
                separated.push_bind(*owner_type);
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY created_at, name");

        let rows: Vec<AttachmentRecord> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows)
    }

    /// Commit a migration: reference, object key and folder in one write.
    ///
    /// A record that already carries an object key is never rewritten.
    pub async fn commit_migration(
        &self,
        name: &str,
        reference: &str,
        key: &str,
    ) -> OffloadResult<CommitOutcome> {
        let result = sqlx::query(
            "UPDATE files SET file_url = ?, folder = ?, old_parent = ?, content_hash = ?
             WHERE name = ? AND (content_hash IS NULL OR content_hash = '')",
        )
        .bind(reference)
        .bind(ATTACHMENTS_FOLDER)
        .bind(ATTACHMENTS_FOLDER)
        .bind(key)
        .bind(name)
        .execute(&*self.db)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(CommitOutcome::Committed);
        }

        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files WHERE name = ?")
            .bind(name)
            .fetch_one(&*self.db)
            .await?;
        Ok(if exists > 0 {
            CommitOutcome::KeyAlreadyAssigned
        } else {
            CommitOutcome::RecordMissing
        })
    }

    /// Folder path the owning entity declares for its files, if any.
    pub async fn owner_folder_path(
        &self,
        owner_type: &str,
        owner_name: &str,
    ) -> OffloadResult<Option<String>> {
        let path = sqlx::query_scalar::<_, Option<String>>(
            "SELECT s3_folder_path FROM owner_folder_paths
             WHERE owner_type = ? AND owner_name = ?",
        )
        .bind(owner_type)
        .bind(owner_name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(path.flatten())
    }
}
