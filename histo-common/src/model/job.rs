// histo-common/src/model/job.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use super::status::{RemoteState, RemoteStatus};
use super::version_key::VersionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Start accepted, no progress reported yet.
    Starting,
    Downloading,
    Paused,
    Installed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Installed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Maps a remote status onto a job state; `unknown` has no counterpart.
    pub fn from_remote(state: RemoteState) -> Option<Self> {
        match state {
            RemoteState::Starting => Some(JobState::Starting),
            RemoteState::Downloading => Some(JobState::Downloading),
            RemoteState::Paused => Some(JobState::Paused),
            RemoteState::Installed => Some(JobState::Installed),
            RemoteState::Failed => Some(JobState::Failed),
            RemoteState::Cancelled => Some(JobState::Cancelled),
            RemoteState::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Starting => "starting",
            JobState::Downloading => "downloading",
            JobState::Paused => "paused",
            JobState::Installed => "installed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally issued command that a poll has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCommand {
    Pause,
    Resume,
    Cancel,
}

impl JobCommand {
    /// The job state that confirms this command took effect remotely.
    pub fn target_state(&self) -> JobState {
        match self {
            JobCommand::Pause => JobState::Paused,
            JobCommand::Resume => JobState::Downloading,
            JobCommand::Cancel => JobState::Cancelled,
        }
    }

    /// Path segment of the worker endpoint for this command.
    pub fn endpoint(&self) -> &'static str {
        match self {
            JobCommand::Pause => "pause",
            JobCommand::Resume => "resume",
            JobCommand::Cancel => "cancel",
        }
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 0..=100
    pub percent: u8,
    pub bytes_done: u64,
    /// 0 means unknown.
    pub bytes_total: u64,
    /// Install stage reported by the worker (`client`, `libraries`, `assets`, ...).
    pub stage: Option<String>,
}

impl Progress {
    pub fn is_indeterminate(&self) -> bool {
        self.bytes_total == 0
    }

    pub fn from_remote(status: &RemoteStatus) -> Self {
        Self {
            percent: status.percent,
            bytes_done: status.bytes_done,
            bytes_total: status.bytes_total,
            stage: status.stage.clone(),
        }
    }
}

/// One tracked install attempt for a version key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallJob {
    pub key: VersionKey,
    pub state: JobState,
    pub full_assets: bool,
    pub progress: Progress,
    /// Last human-readable message from the worker.
    pub message: Option<String>,
    pub last_error: Option<String>,
    pub pending_command: Option<JobCommand>,
    /// Incremented on every mutation; observers use it to discard stale snapshots.
    pub revision: u64,
}

impl InstallJob {
    pub fn new(key: VersionKey, full_assets: bool) -> Self {
        Self {
            key,
            state: JobState::Starting,
            full_assets,
            progress: Progress::default(),
            message: None,
            last_error: None,
            pending_command: None,
            revision: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobState::Installed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Starting.is_terminal());
        assert!(!JobState::Downloading.is_terminal());
        assert!(!JobState::Paused.is_terminal());
    }

    #[test]
    fn unknown_is_not_a_job_state() {
        assert_eq!(JobState::from_remote(RemoteState::Unknown), None);
        assert_eq!(
            JobState::from_remote(RemoteState::Paused),
            Some(JobState::Paused)
        );
    }

    #[test]
    fn commands_confirm_on_their_target_state() {
        assert_eq!(JobCommand::Pause.target_state(), JobState::Paused);
        assert_eq!(JobCommand::Resume.target_state(), JobState::Downloading);
        assert_eq!(JobCommand::Cancel.target_state(), JobState::Cancelled);
    }

    #[test]
    fn new_job_starts_empty() {
        let job = InstallJob::new(VersionKey::new("release", "1.0").unwrap(), true);
        assert_eq!(job.state, JobState::Starting);
        assert!(job.progress.is_indeterminate());
        assert!(job.pending_command.is_none());
        assert_eq!(job.revision, 0);
    }
}
