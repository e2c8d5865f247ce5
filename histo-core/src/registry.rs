// histo-core/src/registry.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use histo_common::model::{InstallJob, JobCommand, JobState, RemoteStatus, VersionKey};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::fanout::Fanout;
use crate::reconciler::{self, PollOutcome};

/// Mutable part of a job, guarded by the per-key lock.
#[derive(Debug)]
pub(crate) struct JobSlot {
    pub(crate) job: InstallJob,
    /// Contradicting polls the optimistic state of `pending_command` still survives.
    pub(crate) grace_polls: u8,
}

/// One tracked job plus the resources of its poll loop.
#[derive(Debug)]
pub struct JobEntry {
    key: VersionKey,
    slot: Mutex<JobSlot>,
    updates: watch::Sender<InstallJob>,
    cancel: CancellationToken,
    retired: CancellationToken,
    settled: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
}

pub type JobRef = Arc<JobEntry>;

impl JobEntry {
    fn new(job: InstallJob) -> Self {
        let (updates, _) = watch::channel(job.clone());
        Self {
            key: job.key.clone(),
            slot: Mutex::new(JobSlot {
                job,
                grace_polls: 0,
            }),
            updates,
            cancel: CancellationToken::new(),
            retired: CancellationToken::new(),
            settled: CancellationToken::new(),
            poller: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &VersionKey {
        &self.key
    }

    pub fn snapshot(&self) -> InstallJob {
        self.lock_slot().job.clone()
    }

    pub fn state(&self) -> JobState {
        self.lock_slot().job.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<InstallJob> {
        self.updates.subscribe()
    }

    /// Cancelled once the job has left the registry.
    pub(crate) fn retired(&self) -> CancellationToken {
        self.retired.clone()
    }

    /// Cancelled once the first poll answer has been applied, or the job is gone.
    pub(crate) fn settled(&self) -> CancellationToken {
        self.settled.clone()
    }

    pub(crate) fn mark_settled(&self) {
        self.settled.cancel();
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn attach_poller(&self, handle: JoinHandle<()>) {
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() {
            handle.abort();
            return;
        }
        *poller = Some(handle);
    }

    /// Stops the poll loop now; no further polls are issued for this key.
    pub(crate) fn stop_polling(&self) {
        self.cancel.cancel();
        self.settled.cancel();
        if let Some(handle) = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, JobSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The authoritative table of install jobs, one per version key.
///
/// The map lock is only held for lookups and inserts; every mutation of a job
/// goes through that job's own lock via [`JobRegistry::update`].
#[derive(Debug)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<VersionKey, JobRef>>,
    fanout: Arc<Fanout>,
    revisions: AtomicU64,
}

impl JobRegistry {
    pub fn new(fanout: Arc<Fanout>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            fanout,
            revisions: AtomicU64::new(0),
        }
    }

    /// Returns the tracked job for `key`, creating it in `starting` if there is none.
    /// The flag is true when this call created the job.
    pub fn create_or_get_job(&self, key: VersionKey, full_assets: bool) -> (JobRef, bool) {
        self.create_or_get_with(key.clone(), || InstallJob::new(key, full_assets))
    }

    pub(crate) fn create_or_get_with<F>(&self, key: VersionKey, init: F) -> (JobRef, bool)
    where
        F: FnOnce() -> InstallJob,
    {
        let entry = {
            let mut jobs = self.lock_jobs();
            if let Some(existing) = jobs.get(&key) {
                return (Arc::clone(existing), false);
            }
            let mut job = init();
            job.revision = self.next_revision();
            let entry = Arc::new(JobEntry::new(job));
            jobs.insert(key.clone(), Arc::clone(&entry));
            entry
        };
        debug!("[{}] Job registered", key);
        self.fanout.publish_job(&entry.snapshot());
        (entry, true)
    }

    pub fn get_job(&self, key: &VersionKey) -> Option<InstallJob> {
        self.get(key).map(|entry| entry.snapshot())
    }

    pub fn get(&self, key: &VersionKey) -> Option<JobRef> {
        self.lock_jobs().get(key).cloned()
    }

    /// Snapshots of every tracked job, ordered by key.
    pub fn jobs(&self) -> Vec<InstallJob> {
        let entries: Vec<JobRef> = self.lock_jobs().values().cloned().collect();
        let mut jobs: Vec<InstallJob> = entries.iter().map(|e| e.snapshot()).collect();
        jobs.sort_by(|a, b| a.key.cmp(&b.key));
        jobs
    }

    pub fn len(&self) -> usize {
        self.lock_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merges one poll result into the job for `key`.
    pub fn apply_remote_status(
        &self,
        key: &VersionKey,
        status: &RemoteStatus,
    ) -> Option<(bool, PollOutcome)> {
        let entry = self.get(key)?;
        Some(self.apply_status(&entry, status))
    }

    pub(crate) fn apply_status(&self, entry: &JobEntry, status: &RemoteStatus) -> (bool, PollOutcome) {
        self.update(entry, |slot| {
            let (changed, outcome) = reconciler::apply_status(slot, status);
            (changed, (changed, outcome))
        })
    }

    /// Records a locally issued command. Returns false if the job's state
    /// does not accept it (or there is no job).
    pub fn set_pending_command(&self, key: &VersionKey, command: JobCommand) -> bool {
        match self.get(key) {
            Some(entry) => self.issue_command(&entry, command),
            None => false,
        }
    }

    pub(crate) fn issue_command(&self, entry: &JobEntry, command: JobCommand) -> bool {
        self.update(entry, |slot| reconciler::issue_command(slot, command))
    }

    /// Drops the job for `key`, stopping its poll loop.
    pub fn remove_job(&self, key: &VersionKey) -> Option<InstallJob> {
        let entry = self.lock_jobs().remove(key)?;
        entry.stop_polling();
        debug!("[{}] Job removed", key);
        self.fanout.publish_removed(key);
        entry.retired.cancel();
        Some(entry.snapshot())
    }

    /// Applies `f` to the job under its lock. When `f` reports a change the
    /// job gets a fresh revision and observers are notified after the lock
    /// is released.
    pub(crate) fn update<R, F>(&self, entry: &JobEntry, f: F) -> R
    where
        F: FnOnce(&mut JobSlot) -> (bool, R),
    {
        let (published, result) = {
            let mut slot = entry.lock_slot();
            let (changed, result) = f(&mut slot);
            if !changed {
                return result;
            }
            slot.job.revision = self.next_revision();
            let snapshot = slot.job.clone();
            entry.updates.send_replace(snapshot.clone());
            (snapshot, result)
        };
        self.fanout.publish_job(&published);
        result
    }

    /// Removes a finished job once everything it owed observers is delivered.
    pub(crate) fn retire(&self, entry: &JobEntry) {
        entry.cancel.cancel();
        // The poll loop may be the caller; detach instead of aborting it.
        drop(
            entry
                .poller
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let removed = {
            let mut jobs = self.lock_jobs();
            match jobs.get(&entry.key) {
                Some(current) if std::ptr::eq(Arc::as_ptr(current), entry) => {
                    jobs.remove(&entry.key);
                    true
                }
                _ => false,
            }
        };
        if removed {
            debug!("[{}] Job retired in state {}", entry.key, entry.state());
            self.fanout.publish_removed(&entry.key);
        }
        entry.settled.cancel();
        entry.retired.cancel();
    }

    /// Stops every poll loop and forgets all jobs without notifying observers.
    pub(crate) fn clear(&self) -> usize {
        let entries: Vec<JobRef> = self.lock_jobs().drain().map(|(_, e)| e).collect();
        for entry in &entries {
            entry.stop_polling();
            entry.retired.cancel();
        }
        entries.len()
    }

    fn next_revision(&self) -> u64 {
        self.revisions.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<VersionKey, JobRef>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
