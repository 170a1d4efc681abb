//! The process-wide offload settings singleton.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::time::Duration;
use tracing::warn;

/// Presigned URL lifetime used when the settings leave it unset.
pub const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 120;

/// Longest lifetime S3 accepts for a presigned URL (7 days).
pub const MAX_SIGNED_URL_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// Credentials, bucket and policy flags for the object store.
///
/// Read from the host database on every operation that needs it and passed
/// down explicitly, so rotated credentials apply without a restart.
#[derive(Serialize, Deserialize, Clone, FromRow, Default)]
pub struct Settings {
    pub aws_key: Option<String>,

    /// Secret-scoped; never logged or serialized back out.
    #[serde(skip_serializing)]
    pub aws_secret: Option<String>,

    pub region_name: Option<String>,

    pub bucket_name: String,

    /// Root folder prepended to generated keys.
    pub folder_name: Option<String>,

    /// Custom endpoint for S3-compatible stores.
    pub endpoint_url: Option<String>,

    /// Whether deleting a record also deletes its object.
    pub delete_file_from_cloud: bool,

    pub signed_url_expiry_time: Option<i64>,
}

impl Settings {
    /// Both halves of the credential pair are configured.
    pub fn has_credentials(&self) -> bool {
        non_empty(&self.aws_key).is_some() && non_empty(&self.aws_secret).is_some()
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((non_empty(&self.aws_key)?, non_empty(&self.aws_secret)?))
    }

    pub fn region(&self) -> Option<&str> {
        non_empty(&self.region_name)
    }

    pub fn root_folder(&self) -> Option<&str> {
        non_empty(&self.folder_name)
    }

    pub fn custom_endpoint(&self) -> Option<&str> {
        non_empty(&self.endpoint_url)
    }

    /// Presigned URL lifetime. Unset or non-positive values use the
    /// default, as do values past the store's limit.
    pub fn presign_expiry(&self) -> Duration {
        match self.signed_url_expiry_time {
            Some(secs) if secs > 0 && secs as u64 <= MAX_SIGNED_URL_EXPIRY_SECS => {
                Duration::from_secs(secs as u64)
            }
            Some(secs) if secs > 0 => {
                warn!(
                    configured = secs,
                    max = MAX_SIGNED_URL_EXPIRY_SECS,
                    "signed url expiry exceeds the store limit; using default"
                );
                Duration::from_secs(DEFAULT_SIGNED_URL_EXPIRY_SECS)
            }
            _ => Duration::from_secs(DEFAULT_SIGNED_URL_EXPIRY_SECS),
        }
    }

    /// Base URL for direct object links of public files.
    pub fn public_endpoint(&self) -> String {
        if let Some(endpoint) = self.custom_endpoint() {
            return endpoint.trim_end_matches('/').to_string();
        }
        match self.region() {
            Some(region) => format!("https://s3.{}.amazonaws.com", region),
            None => "https://s3.amazonaws.com".to_string(),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("aws_key", &self.aws_key)
            .field("aws_secret", &self.aws_secret.as_ref().map(|_| "***"))
            .field("region_name", &self.region_name)
            .field("bucket_name", &self.bucket_name)
            .field("folder_name", &self.folder_name)
            .field("endpoint_url", &self.endpoint_url)
            .field("delete_file_from_cloud", &self.delete_file_from_cloud)
            .field("signed_url_expiry_time", &self.signed_url_expiry_time)
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
