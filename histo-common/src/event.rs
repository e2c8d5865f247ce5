// histo-common/src/event.rs
use serde::{Deserialize, Serialize};

use crate::model::{CatalogEntry, InstallJob, VersionKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A job was created or mutated; carries the full snapshot.
    JobUpdated(InstallJob),
    /// A job reached a terminal state and left the registry.
    JobRemoved { key: VersionKey },
    /// A completed install was absorbed into the catalog.
    Installed(CatalogEntry),
    LogWarn { message: String },
}

impl EngineEvent {
    pub fn key(&self) -> Option<&VersionKey> {
        match self {
            EngineEvent::JobUpdated(job) => Some(&job.key),
            EngineEvent::JobRemoved { key } => Some(key),
            EngineEvent::Installed(entry) => Some(&entry.key),
            EngineEvent::LogWarn { .. } => None,
        }
    }
}
