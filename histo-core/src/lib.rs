// histo-core/src/lib.rs

pub mod catalog;
pub mod engine;
pub mod fanout;
pub mod poller;
pub mod reconciler;
pub mod registry;

// Re-export key types for easier use by the CLI crate
pub use catalog::Catalog;
pub use engine::{InstallEngine, JobHandle};
pub use fanout::Subscription;
pub use reconciler::PollOutcome;
pub use registry::JobRegistry;
