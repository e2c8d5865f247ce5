// histo-common/src/model/version_key.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HistoError, Result};

const DEFAULT_CATEGORY: &str = "Release";

/// Identifies one installable build: a `(category, folder)` pair.
///
/// The category is case-normalized on construction (`"old_alpha"` becomes
/// `"Old_alpha"`, `"RELEASE"` becomes `"Release"`), so keys built from different
/// spellings compare equal. The canonical string form is `Category/folder`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionKey {
    category: String,
    folder: String,
}

impl VersionKey {
    pub fn new(category: &str, folder: &str) -> Result<Self> {
        let folder = folder.trim();
        if folder.is_empty() {
            return Err(HistoError::InvalidVersionKey(format!("{category}/{folder}")));
        }
        Ok(Self {
            category: normalize_category(category),
            folder: folder.to_string(),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }
}

/// First letter upper-case, the rest lower-case; empty means `Release`.
pub fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        None => DEFAULT_CATEGORY.to_string(),
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.folder)
    }
}

impl FromStr for VersionKey {
    type Err = HistoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once('/') {
            Some((category, folder)) => VersionKey::new(category, folder),
            None => Err(HistoError::InvalidVersionKey(s.to_string())),
        }
    }
}

impl TryFrom<String> for VersionKey {
    type Error = HistoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<VersionKey> for String {
    fn from(key: VersionKey) -> Self {
        key.to_string()
    }
}
