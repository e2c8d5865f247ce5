// histo-common/src/lib.rs
pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod remote;

// Re-export key types
pub use config::{Config, PollSettings};
pub use error::{HistoError, Result};
pub use event::EngineEvent;
pub use model::{CatalogEntry, InstallJob, JobCommand, JobState, VersionKey};
pub use remote::RemoteStatusClient;
