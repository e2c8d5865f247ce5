// histo-common/src/model/catalog.rs
use serde::{Deserialize, Serialize};

use super::version_key::VersionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Available,
    Installing,
    Installed,
}

/// A row of the version catalog shown by the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: VersionKey,
    pub display: String,
    pub status: EntryStatus,
    /// Expected install size in bytes, when the catalog knows it.
    pub size_hint: Option<u64>,
    /// Where the entry came from (e.g. `installed`, `remote`, `placeholder`).
    pub source_tag: Option<String>,
}

impl CatalogEntry {
    pub fn new(key: VersionKey, display: impl Into<String>, status: EntryStatus) -> Self {
        Self {
            key,
            display: display.into(),
            status,
            size_hint: None,
            source_tag: None,
        }
    }

    pub fn category(&self) -> &str {
        self.key.category()
    }

    pub fn folder(&self) -> &str {
        self.key.folder()
    }

    pub fn is_installed(&self) -> bool {
        self.status == EntryStatus::Installed
    }
}
