// histo-common/src/remote.rs
use async_trait::async_trait;

use crate::error::Result;
use crate::model::{JobCommand, RemoteSnapshot, RemoteStatus, VersionKey};

/// The narrow protocol the install engine speaks to the out-of-process worker.
///
/// Every call may fail; the engine treats failures of `poll`, `send_command`
/// and `snapshot` as transient. Command effects only become authoritative once
/// a later `poll` reflects them.
#[async_trait]
pub trait RemoteStatusClient: Send + Sync {
    /// Ask the worker to begin installing `key`. Returns the key the worker
    /// confirmed, or `HistoError::StartRejected` once every request shape failed.
    async fn start(&self, key: &VersionKey, full_assets: bool) -> Result<VersionKey>;

    async fn poll(&self, key: &VersionKey) -> Result<RemoteStatus>;

    async fn send_command(&self, key: &VersionKey, command: JobCommand) -> Result<()>;

    /// Bulk state used to re-attach in-flight jobs and to merge the installed set.
    async fn snapshot(&self) -> Result<RemoteSnapshot>;

    async fn pause(&self, key: &VersionKey) -> Result<()> {
        self.send_command(key, JobCommand::Pause).await
    }

    async fn resume(&self, key: &VersionKey) -> Result<()> {
        self.send_command(key, JobCommand::Resume).await
    }

    async fn cancel(&self, key: &VersionKey) -> Result<()> {
        self.send_command(key, JobCommand::Cancel).await
    }
}
