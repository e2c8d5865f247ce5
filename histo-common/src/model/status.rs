// histo-common/src/model/status.rs
use serde::{Deserialize, Serialize};

use super::catalog::CatalogEntry;
use super::version_key::VersionKey;

/// Status as reported by the remote worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteState {
    Starting,
    Downloading,
    Paused,
    Installed,
    Failed,
    Cancelled,
    /// The worker has not registered the job yet.
    Unknown,
}

impl RemoteState {
    /// Lenient parse of the worker's status string. `error` is the legacy
    /// spelling of `failed`; anything unrecognized is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starting" => RemoteState::Starting,
            "downloading" => RemoteState::Downloading,
            "paused" => RemoteState::Paused,
            "installed" => RemoteState::Installed,
            "failed" | "error" => RemoteState::Failed,
            "cancelled" | "canceled" => RemoteState::Cancelled,
            _ => RemoteState::Unknown,
        }
    }
}

/// One normalized poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub state: RemoteState,
    pub percent: u8,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub stage: Option<String>,
    pub message: Option<String>,
}

impl RemoteStatus {
    pub fn new(state: RemoteState, percent: u8) -> Self {
        Self {
            state,
            percent: percent.min(100),
            bytes_done: 0,
            bytes_total: 0,
            stage: None,
            message: None,
        }
    }

    pub fn with_bytes(mut self, done: u64, total: u64) -> Self {
        self.bytes_done = done;
        self.bytes_total = total;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Clamp a worker percentage (which may be fractional or out of range) to 0..=100.
pub fn clamp_percent(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0) as u8
}

/// An install that was already running when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallingRow {
    pub key: VersionKey,
    pub percent: u8,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// Bulk state served by the worker's `/initial` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub installing: Vec<InstallingRow>,
    pub installed: Vec<CatalogEntry>,
}

impl RemoteSnapshot {
    pub fn installed_entry(&self, key: &VersionKey) -> Option<&CatalogEntry> {
        self.installed.iter().find(|entry| &entry.key == key)
    }
}
