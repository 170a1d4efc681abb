//! Batch migration of records still stored on local disk.

use crate::services::{
    OffloadResult,
    records::AttachmentRepo,
    rewriter::{MigrationOutcome, ReferenceRewriter, is_object_store_reference},
};
use serde::Serialize;
use tracing::{error, info};

/// Owner types the batch run skips by default.
pub const BATCH_EXCLUDED_TYPES: [&str; 2] = ["Data Import", "Prepared Report"];

/// Summary of one batch run.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct BatchReport {
    /// Eligible records attempted.
    pub attempted: usize,
    pub migrated: usize,
    pub skipped: usize,
    /// Names of records whose migration failed.
    pub failed: Vec<String>,
}

/// Run every eligible record through the rewriter, one at a time.
///
/// A failing record is logged and counted; it never stops the scan. Only a
/// failure to list the records is returned as an error.
pub async fn migrate_all(
    repo: &AttachmentRepo,
    rewriter: &ReferenceRewriter<'_>,
    exclude_types: &[&str],
) -> OffloadResult<BatchReport> {
    let candidates = repo.list_with_reference(exclude_types).await?;
    let mut report = BatchReport::default();

    for record in candidates
        .iter()
        .filter(|r| !is_object_store_reference(r.reference()))
    {
        report.attempted += 1;
        match rewriter.migrate_one(record).await {
            Ok(MigrationOutcome::Migrated { .. }) => report.migrated += 1,
            Ok(MigrationOutcome::Skipped { .. }) => report.skipped += 1,
            Err(err) => {
                error!(record = %record.name, error = %err, "migration failed");
                report.failed.push(record.name.clone());
            }
        }
    }

    info!(
        attempted = report.attempted,
        migrated = report.migrated,
        skipped = report.skipped,
        failed = report.failed.len(),
        "batch migration finished"
    );
    Ok(report)
}
