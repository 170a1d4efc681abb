//! Represents one file known to the host system.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An attachment record as stored in the host `files` table.
///
/// Before migration `file_url` is a site-relative local path such as
/// `/files/report.pdf` (public) or `/private/files/report.pdf` (private).
/// After migration it is either the redirect endpoint carrying the object
/// key or a direct object URL, and `content_hash` holds the object key.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct AttachmentRecord {
    /// Unique record id.
    pub name: String,

    /// Display name of the file.
    pub file_name: String,

    /// Logical reference used by callers to address the file.
    #[serde(default)]
    pub file_url: Option<String>,

    /// Access class: private files are read through presigned redirects.
    #[serde(default)]
    pub is_private: bool,

    /// Type of the owning entity, if the file is attached to one.
    #[serde(default)]
    pub attached_to_doctype: Option<String>,

    /// Name of the owning entity.
    #[serde(default)]
    pub attached_to_name: Option<String>,

    /// Object key once migrated.
    #[serde(default)]
    pub content_hash: Option<String>,

    #[serde(default)]
    pub folder: Option<String>,
}

impl AttachmentRecord {
    /// The logical reference, or an empty string when unset.
    pub fn reference(&self) -> &str {
        self.file_url.as_deref().unwrap_or("")
    }

    /// The object key, when one has been assigned.
    pub fn object_key(&self) -> Option<&str> {
        self.content_hash.as_deref().filter(|key| !key.is_empty())
    }

    pub fn owner_type(&self) -> Option<&str> {
        self.attached_to_doctype.as_deref().filter(|t| !t.is_empty())
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.attached_to_name.as_deref().filter(|n| !n.is_empty())
    }
}
