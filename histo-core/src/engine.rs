// histo-core/src/engine.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use histo_common::config::Config;
use histo_common::error::{HistoError, Result};
use histo_common::event::EngineEvent;
use histo_common::model::{
    CatalogEntry, InstallJob, JobCommand, JobState, Progress, VersionKey,
};
use histo_common::remote::RemoteStatusClient;
use histo_net::HttpRemote;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::catalog::Catalog;
use crate::fanout::{Fanout, Subscription};
use crate::poller::Poller;
use crate::reconciler::Reconciler;
use crate::registry::{JobEntry, JobRef, JobRegistry};

/// Starts, tracks and reconciles install jobs against the remote worker.
///
/// Commands are fire-and-forget and must be issued from within a Tokio
/// runtime; their effect is observed through [`InstallEngine::subscribe`],
/// [`InstallEngine::events`] or a [`JobHandle`].
pub struct InstallEngine {
    remote: Arc<dyn RemoteStatusClient>,
    registry: Arc<JobRegistry>,
    fanout: Arc<Fanout>,
    catalog: Arc<Catalog>,
    reconciler: Arc<Reconciler>,
    poller: Arc<Poller>,
    start_gates: Mutex<HashMap<VersionKey, Arc<tokio::sync::Mutex<()>>>>,
    /// Requested key to the key the worker confirmed the install under.
    aliases: Mutex<HashMap<VersionKey, VersionKey>>,
}

impl InstallEngine {
    pub fn new(remote: Arc<dyn RemoteStatusClient>, catalog: Arc<Catalog>, config: &Config) -> Self {
        let fanout = Fanout::new();
        let registry = Arc::new(JobRegistry::new(Arc::clone(&fanout)));
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&remote),
            Arc::clone(&registry),
            Arc::clone(&catalog),
            Arc::clone(&fanout),
            config.poll.backoff,
            config.catalog_refresh_attempts,
        ));
        let poller = Arc::new(Poller::new(
            Arc::clone(&remote),
            Arc::clone(&reconciler),
            config.poll,
        ));
        debug!(
            "Install engine ready (active {:?}, paused {:?}, backoff {:?})",
            config.poll.active, config.poll.paused, config.poll.backoff
        );
        Self {
            remote,
            registry,
            fanout,
            catalog,
            reconciler,
            poller,
            start_gates: Mutex::new(HashMap::new()),
            aliases: Mutex::new(HashMap::new()),
        }
    }

    /// An engine talking HTTP to the worker at `config.api_base_url`, with an empty catalog.
    pub fn from_config(config: &Config) -> Result<Self> {
        let remote: Arc<dyn RemoteStatusClient> = Arc::new(HttpRemote::new(config)?);
        Ok(Self::new(remote, Arc::new(Catalog::new()), config))
    }

    /// Starts installing `key`, or returns the job already tracking it.
    ///
    /// Concurrent calls for the same key are serialized, so only one start
    /// request reaches the worker. A start failure creates no job.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn request_install(&self, key: VersionKey, full_assets: bool) -> Result<JobHandle> {
        let gate = self.start_gate(&key);
        let result = {
            let _guard = gate.lock().await;
            self.start_locked(&key, full_assets).await
        };
        drop(gate);
        self.release_start_gate(&key);
        result
    }

    async fn start_locked(&self, key: &VersionKey, full_assets: bool) -> Result<JobHandle> {
        if let Some(entry) = self.resolve(key) {
            debug!("[{}] Install already tracked, returning existing job", key);
            return Ok(JobHandle::new(&entry));
        }

        info!("[{}] Requesting install (full assets: {})", key, full_assets);
        let confirmed = self.remote.start(key, full_assets).await?;
        if &confirmed != key {
            debug!("[{}] Worker confirmed the install as '{}'", key, confirmed);
            self.lock_aliases().insert(key.clone(), confirmed.clone());
        }

        let (entry, created) = self.registry.create_or_get_job(confirmed, full_assets);
        if created {
            self.attach(&entry);
        }
        Ok(JobHandle::new(&entry))
    }

    fn attach(&self, entry: &JobRef) {
        self.catalog.mark_installing(entry.key());
        let handle = self.poller.spawn(Arc::clone(entry));
        entry.attach_poller(handle);
    }

    /// The job tracking `key`, directly or under the key the worker confirmed for it.
    fn resolve(&self, key: &VersionKey) -> Option<JobRef> {
        if let Some(entry) = self.registry.get(key) {
            return Some(entry);
        }
        let mut aliases = self.lock_aliases();
        let confirmed = aliases.get(key)?;
        match self.registry.get(confirmed) {
            Some(entry) => Some(entry),
            None => {
                aliases.remove(key);
                None
            }
        }
    }

    fn lock_aliases(&self) -> std::sync::MutexGuard<'_, HashMap<VersionKey, VersionKey>> {
        self.aliases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_gate(&self, key: &VersionKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self
            .start_gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(key.clone()).or_default())
    }

    fn release_start_gate(&self, key: &VersionKey) {
        let mut gates = self
            .start_gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if gates.get(key).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            gates.remove(key);
        }
    }

    /// Optimistically pauses the job; returns false if nothing was issued.
    pub fn request_pause(&self, key: &VersionKey) -> bool {
        self.issue(key, JobCommand::Pause)
    }

    pub fn request_resume(&self, key: &VersionKey) -> bool {
        self.issue(key, JobCommand::Resume)
    }

    /// Sends a cancel; the job turns `cancelled` as soon as the worker acknowledges it.
    pub fn request_cancel(&self, key: &VersionKey) -> bool {
        self.issue(key, JobCommand::Cancel)
    }

    fn issue(&self, key: &VersionKey, command: JobCommand) -> bool {
        let Some(entry) = self.resolve(key) else {
            debug!("[{}] Ignoring {}: no active job", key, command);
            return false;
        };
        if !self.registry.issue_command(&entry, command) {
            debug!("[{}] Ignoring {}: job is {}", key, command, entry.state());
            return false;
        }

        let remote = Arc::clone(&self.remote);
        let reconciler = Arc::clone(&self.reconciler);
        let fanout = Arc::clone(&self.fanout);
        tokio::spawn(async move {
            send_command(remote, reconciler, fanout, entry, command).await;
        });
        true
    }

    pub fn subscribe<F>(&self, key: VersionKey, on_update: F) -> Subscription
    where
        F: Fn(&InstallJob) + Send + Sync + 'static,
    {
        self.fanout.subscribe(key, on_update)
    }

    pub fn on_installed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CatalogEntry) + Send + Sync + 'static,
    {
        self.fanout.on_installed(callback)
    }

    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.fanout.events()
    }

    pub fn job(&self, key: &VersionKey) -> Option<InstallJob> {
        self.resolve(key).map(|entry| entry.snapshot())
    }

    pub fn handle(&self, key: &VersionKey) -> Option<JobHandle> {
        self.resolve(key).map(|entry| JobHandle::new(&entry))
    }

    pub fn jobs(&self) -> Vec<InstallJob> {
        self.registry.jobs()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Loads the worker's `/initial` state: merges the installed set into the
    /// catalog and re-attaches a poller to every install already in flight.
    pub async fn rehydrate(&self) -> Result<Vec<JobHandle>> {
        let snapshot = self.remote.snapshot().await?;
        self.catalog.absorb_installed(&snapshot.installed);

        let mut handles = Vec::with_capacity(snapshot.installing.len());
        for row in snapshot.installing {
            let key = row.key.clone();
            let (entry, created) = self.registry.create_or_get_with(key.clone(), || {
                let mut job = InstallJob::new(row.key, true);
                job.state = JobState::Downloading;
                job.progress = Progress {
                    percent: row.percent,
                    bytes_done: row.bytes_done,
                    bytes_total: row.bytes_total,
                    stage: None,
                };
                job
            });
            if created {
                debug!("[{}] Re-attached in-flight install at {}%", key, row.percent);
                self.attach(&entry);
            }
            handles.push(JobHandle::new(&entry));
        }
        info!(
            "Rehydrated {} in-flight install(s), {} installed version(s)",
            handles.len(),
            snapshot.installed.len()
        );
        Ok(handles)
    }

    /// Stops every poll loop and forgets all jobs. Pending [`JobHandle::wait`]
    /// calls return an error.
    pub fn shutdown(&self) {
        let stopped = self.registry.clear();
        self.lock_aliases().clear();
        if stopped > 0 {
            debug!("Install engine stopped {} poller(s)", stopped);
        }
    }
}

impl Drop for InstallEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn send_command(
    remote: Arc<dyn RemoteStatusClient>,
    reconciler: Arc<Reconciler>,
    fanout: Arc<Fanout>,
    entry: JobRef,
    command: JobCommand,
) {
    let key = entry.key();
    match remote.send_command(key, command).await {
        Ok(()) => {
            debug!("[{}] {} acknowledged by worker", key, command);
            if command == JobCommand::Cancel {
                reconciler.cancel_confirmed(&entry);
            }
        }
        Err(e) => {
            // The pending command stays set; the next polls decide whether it took effect.
            warn!("[{}] {} request failed: {}", key, command, e);
            fanout.publish_warning(format!("{command} of {key} failed: {e}"));
        }
    }
}

/// A caller's view of one job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    key: VersionKey,
    rx: watch::Receiver<InstallJob>,
    retired: CancellationToken,
    settled: CancellationToken,
}

impl JobHandle {
    fn new(entry: &JobEntry) -> Self {
        Self {
            key: entry.key().clone(),
            rx: entry.watch(),
            retired: entry.retired(),
            settled: entry.settled(),
        }
    }

    pub fn key(&self) -> &VersionKey {
        &self.key
    }

    /// The latest state of the job.
    pub fn snapshot(&self) -> InstallJob {
        self.rx.borrow().clone()
    }

    /// Resolves once the worker's answer to the first poll has been applied.
    ///
    /// Rehydrated jobs start out as `downloading`; after this the state
    /// reflects what the worker reported.
    pub async fn settled(&self) {
        self.settled.cancelled().await;
    }

    /// Waits for the next change. `None` once the job is no longer tracked.
    pub async fn changed(&mut self) -> Option<InstallJob> {
        tokio::select! {
            res = self.rx.changed() => res.ok().map(|_| self.rx.borrow_and_update().clone()),
            _ = self.retired.cancelled() => {
                if self.rx.has_changed().unwrap_or(false) {
                    Some(self.rx.borrow_and_update().clone())
                } else {
                    None
                }
            }
        }
    }

    /// Waits until the job has finished and left the engine.
    ///
    /// `installed` yields the final job; `failed` and `cancelled` yield
    /// [`HistoError::RemoteFailure`] and [`HistoError::RemoteCancelled`].
    pub async fn wait(mut self) -> Result<InstallJob> {
        loop {
            let job = self.rx.borrow_and_update().clone();
            if job.is_terminal() {
                self.retired.cancelled().await;
                return outcome(job);
            }
            if self.retired.is_cancelled() {
                return Err(HistoError::NotFound(format!(
                    "install of '{}' is no longer tracked",
                    self.key
                )));
            }
            tokio::select! {
                res = self.rx.changed() => {
                    if res.is_err() && !self.rx.borrow().is_terminal() {
                        return Err(HistoError::NotFound(format!(
                            "install of '{}' is no longer tracked",
                            self.key
                        )));
                    }
                }
                _ = self.retired.cancelled() => {}
            }
        }
    }
}

fn outcome(job: InstallJob) -> Result<InstallJob> {
    match job.state {
        JobState::Failed => Err(HistoError::RemoteFailure {
            key: job.key.to_string(),
            message: job
                .last_error
                .unwrap_or_else(|| "install failed".to_string()),
        }),
        JobState::Cancelled => Err(HistoError::RemoteCancelled(job.key.to_string())),
        _ => Ok(job),
    }
}
