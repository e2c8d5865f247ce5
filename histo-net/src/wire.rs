// histo-net/src/wire.rs
//! JSON shapes exchanged with the remote worker.
//!
//! Everything here is lenient: numeric fields may be missing or fractional,
//! and rows that cannot be turned into a valid `VersionKey` are dropped.
use histo_common::model::status::clamp_percent;
use histo_common::model::{
    CatalogEntry, EntryStatus, InstallingRow, RemoteSnapshot, RemoteState, RemoteStatus,
    VersionKey,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub started: Option<bool>,
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StartResponse {
    /// The key the worker echoed back, if it sent a parseable one.
    pub fn confirmed_key(&self) -> Option<VersionKey> {
        match self.version.as_ref()? {
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub overall_percent: Option<f64>,
    #[serde(default)]
    pub bytes_done: Option<u64>,
    #[serde(default)]
    pub bytes_total: Option<u64>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<StatusResponse> for RemoteStatus {
    fn from(wire: StatusResponse) -> Self {
        RemoteStatus {
            state: RemoteState::parse(&wire.status),
            percent: clamp_percent(wire.overall_percent.unwrap_or(0.0)),
            bytes_done: wire.bytes_done.unwrap_or(0),
            bytes_total: wire.bytes_total.unwrap_or(0),
            stage: wire.stage.filter(|s| !s.is_empty()),
            message: wire.message.filter(|s| !s.is_empty()),
        }
    }
}

/// Rows identify their version either as `version_key` or as `category` + `folder`.
#[derive(Debug, Default, Deserialize)]
struct KeyFields {
    #[serde(default)]
    version_key: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    folder: Option<String>,
}

impl KeyFields {
    fn key(&self) -> Option<VersionKey> {
        if let Some(raw) = &self.version_key {
            return raw.parse().ok();
        }
        VersionKey::new(self.category.as_deref()?, self.folder.as_deref()?).ok()
    }
}

#[derive(Debug, Deserialize)]
struct InstallingWire {
    #[serde(flatten)]
    ident: KeyFields,
    #[serde(default)]
    overall_percent: Option<f64>,
    #[serde(default)]
    bytes_done: Option<u64>,
    #[serde(default)]
    bytes_total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct InstalledWire {
    #[serde(flatten)]
    ident: KeyFields,
    #[serde(default)]
    display: Option<String>,
    #[serde(default, alias = "total_size_bytes")]
    size_hint: Option<u64>,
    #[serde(default, alias = "source")]
    source_tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InitialResponse {
    #[serde(default)]
    installing: Vec<InstallingWire>,
    #[serde(default)]
    installed: Vec<InstalledWire>,
}

impl From<InitialResponse> for RemoteSnapshot {
    fn from(wire: InitialResponse) -> Self {
        let installing = wire
            .installing
            .into_iter()
            .filter_map(|row| {
                let Some(key) = row.ident.key() else {
                    debug!("Skipping installing row without a usable key: {:?}", row.ident);
                    return None;
                };
                Some(InstallingRow {
                    key,
                    percent: clamp_percent(row.overall_percent.unwrap_or(0.0)),
                    bytes_done: row.bytes_done.unwrap_or(0),
                    bytes_total: row.bytes_total.unwrap_or(0),
                })
            })
            .collect();

        let installed = wire
            .installed
            .into_iter()
            .filter_map(|row| {
                let Some(key) = row.ident.key() else {
                    debug!("Skipping installed row without a usable key: {:?}", row.ident);
                    return None;
                };
                let display = row
                    .display
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| key.folder().to_string());
                Some(CatalogEntry {
                    key,
                    display,
                    status: EntryStatus::Installed,
                    size_hint: row.size_hint,
                    source_tag: row.source_tag.or_else(|| Some("installed".to_string())),
                })
            })
            .collect();

        RemoteSnapshot {
            installing,
            installed,
        }
    }
}
