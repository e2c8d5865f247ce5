// histo-common/src/model/mod.rs
// Declares the modules within the model directory.
pub mod catalog;
pub mod job;
pub mod status;
pub mod version_key;

// Re-export
pub use catalog::{CatalogEntry, EntryStatus};
pub use job::{InstallJob, JobCommand, JobState, Progress};
pub use status::{InstallingRow, RemoteSnapshot, RemoteState, RemoteStatus};
pub use version_key::VersionKey;
