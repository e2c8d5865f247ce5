// histo-core/src/reconciler.rs
//! Merges remote status into jobs that may carry an unconfirmed local command,
//! and folds completed installs into the catalog.
use std::sync::Arc;
use std::time::Duration;

use histo_common::model::{CatalogEntry, JobCommand, JobState, Progress, RemoteStatus};
use histo_common::remote::RemoteStatusClient;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::fanout::Fanout;
use crate::registry::{JobEntry, JobRegistry, JobSlot};

/// Contradicting polls an optimistic pause/resume survives before the
/// remote state wins.
pub const OPTIMISTIC_GRACE_POLLS: u8 = 1;

const DEFAULT_FAILURE_MESSAGE: &str = "install failed";

/// What the poll loop should do after a result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Keep polling; carries the job's state after the merge.
    Continue(JobState),
    /// The worker does not know the job yet.
    Retry,
    Terminal(JobState),
}

/// Applies one poll result to the job. Returns whether the job changed.
pub(crate) fn apply_status(slot: &mut JobSlot, status: &RemoteStatus) -> (bool, PollOutcome) {
    let Some(remote) = JobState::from_remote(status.state) else {
        return (false, PollOutcome::Retry);
    };
    if slot.job.is_terminal() {
        return (false, PollOutcome::Terminal(slot.job.state));
    }

    let before = slot.job.clone();
    let job = &mut slot.job;
    job.progress = Progress::from_remote(status);
    if status.message.is_some() {
        job.message = status.message.clone();
    }

    let next = if remote.is_terminal() {
        job.pending_command = None;
        slot.grace_polls = 0;
        remote
    } else {
        match job.pending_command {
            None => remote,
            Some(command) if command.target_state() == remote => {
                debug!("[{}] {} confirmed by worker", job.key, command);
                job.pending_command = None;
                slot.grace_polls = 0;
                remote
            }
            Some(command) if slot.grace_polls > 0 => {
                slot.grace_polls -= 1;
                // Cancel has no optimistic state to hold on to.
                if command == JobCommand::Cancel {
                    remote
                } else {
                    job.state
                }
            }
            Some(command) => {
                debug!(
                    "[{}] {} not confirmed, deferring to worker state {}",
                    job.key, command, remote
                );
                job.pending_command = None;
                remote
            }
        }
    };

    job.state = next;
    if next == JobState::Failed {
        job.last_error = Some(
            status
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
        );
    }

    let outcome = if next.is_terminal() {
        PollOutcome::Terminal(next)
    } else {
        PollOutcome::Continue(next)
    };
    (*job != before, outcome)
}

/// Records a user command and applies its optimistic state. Returns
/// `(changed, accepted)`.
pub(crate) fn issue_command(slot: &mut JobSlot, command: JobCommand) -> (bool, bool) {
    let job = &mut slot.job;
    if job.is_terminal() {
        return (false, false);
    }
    let before = job.clone();
    match command {
        JobCommand::Pause => {
            if !matches!(job.state, JobState::Starting | JobState::Downloading) {
                return (false, false);
            }
            job.state = JobState::Paused;
        }
        JobCommand::Resume => {
            if job.state != JobState::Paused {
                return (false, false);
            }
            job.state = JobState::Downloading;
        }
        // Reflected only once the worker acknowledges it.
        JobCommand::Cancel => {}
    }
    job.pending_command = Some(command);
    slot.grace_polls = OPTIMISTIC_GRACE_POLLS;
    (*job != before, true)
}

/// Marks the job cancelled without waiting for a confirming poll.
pub(crate) fn force_cancelled(slot: &mut JobSlot) -> bool {
    if slot.job.is_terminal() {
        return false;
    }
    slot.job.state = JobState::Cancelled;
    slot.job.pending_command = None;
    slot.grace_polls = 0;
    true
}

/// Drives the side effects of terminal transitions.
pub struct Reconciler {
    remote: Arc<dyn RemoteStatusClient>,
    registry: Arc<JobRegistry>,
    catalog: Arc<Catalog>,
    fanout: Arc<Fanout>,
    backoff: Duration,
    refresh_attempts: u32,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn RemoteStatusClient>,
        registry: Arc<JobRegistry>,
        catalog: Arc<Catalog>,
        fanout: Arc<Fanout>,
        backoff: Duration,
        refresh_attempts: u32,
    ) -> Self {
        Self {
            remote,
            registry,
            catalog,
            fanout,
            backoff,
            refresh_attempts: refresh_attempts.max(1),
        }
    }

    /// Applies a poll result and, on the first terminal transition, settles
    /// the catalog and retires the job.
    pub(crate) async fn apply_poll(&self, entry: &JobEntry, status: &RemoteStatus) -> PollOutcome {
        let (changed, outcome) = self.registry.apply_status(entry, status);
        if !changed {
            return outcome;
        }
        match outcome {
            PollOutcome::Terminal(JobState::Installed) => self.complete_install(entry).await,
            PollOutcome::Terminal(state) => {
                let job = entry.snapshot();
                match state {
                    JobState::Failed => warn!(
                        "[{}] Install failed: {}",
                        job.key,
                        job.last_error.as_deref().unwrap_or(DEFAULT_FAILURE_MESSAGE)
                    ),
                    _ => info!("[{}] Install {} by worker", job.key, state),
                }
                self.catalog.clear_installing(entry.key());
                self.registry.retire(entry);
            }
            PollOutcome::Continue(_) | PollOutcome::Retry => {}
        }
        outcome
    }

    /// Called once the worker acknowledged a cancel command.
    pub(crate) fn cancel_confirmed(&self, entry: &JobEntry) {
        let changed = self.registry.update(entry, |slot| {
            let changed = force_cancelled(slot);
            (changed, changed)
        });
        if !changed {
            debug!("[{}] Cancel acknowledged for a finished job", entry.key());
            return;
        }
        entry.stop_polling();
        info!("[{}] Install cancelled", entry.key());
        self.catalog.clear_installing(entry.key());
        self.registry.retire(entry);
    }

    /// Replaces the local rows for the key with the worker's installed entry,
    /// then drops the job. The job stays visible until the merge is done.
    async fn complete_install(&self, entry: &JobEntry) {
        let key = entry.key();
        let fresh = self.fetch_installed_entry(entry).await;
        if fresh.is_none() {
            warn!(
                "[{}] Worker snapshot does not list the install yet; promoting local entry",
                key
            );
        }
        let merged = self.catalog.merge_installed(key, fresh);
        info!("[{}] Installed ({})", key, merged.display);
        self.fanout.publish_installed(&merged);
        self.registry.retire(entry);
    }

    async fn fetch_installed_entry(&self, entry: &JobEntry) -> Option<CatalogEntry> {
        let key = entry.key();
        for attempt in 1..=self.refresh_attempts {
            match self.remote.snapshot().await {
                Ok(snapshot) => {
                    if let Some(found) = snapshot.installed_entry(key) {
                        return Some(found.clone());
                    }
                    debug!(
                        "[{}] Snapshot attempt {}/{} does not list the install",
                        key, attempt, self.refresh_attempts
                    );
                }
                Err(e) => debug!(
                    "[{}] Snapshot attempt {}/{} failed: {}",
                    key, attempt, self.refresh_attempts, e
                ),
            }
            if attempt < self.refresh_attempts {
                tokio::select! {
                    _ = entry.cancel_token().cancelled() => break,
                    _ = tokio::time::sleep(self.backoff) => {}
                }
            }
        }
        None
    }
}
