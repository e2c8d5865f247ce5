// histo-core/src/fanout.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use histo_common::event::EngineEvent;
use histo_common::model::{CatalogEntry, InstallJob, VersionKey};
use tokio::sync::broadcast;

const EVENT_CHANNEL_SIZE: usize = 256;

type JobCallback = Arc<dyn Fn(&InstallJob) + Send + Sync>;
type InstalledCallback = Arc<dyn Fn(&CatalogEntry) + Send + Sync>;

struct JobSubscriber {
    id: u64,
    /// Highest revision delivered; older snapshots are dropped.
    last_revision: AtomicU64,
    callback: JobCallback,
}

/// Delivers job changes to renderers without the engine knowing about them.
///
/// Callbacks run on the task that made the change, after the job lock is
/// released, so they may call back into the engine.
pub struct Fanout {
    next_id: AtomicU64,
    job_subscribers: Mutex<HashMap<VersionKey, Vec<Arc<JobSubscriber>>>>,
    installed_subscribers: Mutex<Vec<(u64, InstalledCallback)>>,
    /// Highest revision put on the stream per key. Revisions are global, so a
    /// reinstall under the same key always streams.
    streamed: Mutex<HashMap<VersionKey, u64>>,
    events: broadcast::Sender<EngineEvent>,
}

impl Fanout {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            job_subscribers: Mutex::new(HashMap::new()),
            installed_subscribers: Mutex::new(Vec::new()),
            streamed: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn subscribe<F>(self: &Arc<Self>, key: VersionKey, callback: F) -> Subscription
    where
        F: Fn(&InstallJob) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(JobSubscriber {
            id,
            last_revision: AtomicU64::new(0),
            callback: Arc::new(callback),
        });
        self.job_subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .push(subscriber);
        Subscription {
            fanout: Arc::downgrade(self),
            target: Target::Job(key, id),
        }
    }

    pub fn on_installed<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&CatalogEntry) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.installed_subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        Subscription {
            fanout: Arc::downgrade(self),
            target: Target::Installed(id),
        }
    }

    /// Every engine event. `JobUpdated` snapshots arrive in revision order per
    /// key; a snapshot older than one already sent is skipped.
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish_job(&self, job: &InstallJob) {
        let subscribers = self
            .job_subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job.key)
            .cloned()
            .unwrap_or_default();
        for subscriber in subscribers {
            if subscriber
                .last_revision
                .fetch_max(job.revision, Ordering::AcqRel)
                < job.revision
            {
                (subscriber.callback)(job);
            }
        }

        let mut streamed = self.streamed.lock().unwrap_or_else(PoisonError::into_inner);
        let last = streamed.entry(job.key.clone()).or_insert(0);
        if *last >= job.revision {
            return;
        }
        *last = job.revision;
        // No receivers is fine.
        let _ = self.events.send(EngineEvent::JobUpdated(job.clone()));
    }

    pub(crate) fn publish_removed(&self, key: &VersionKey) {
        let _ = self
            .events
            .send(EngineEvent::JobRemoved { key: key.clone() });
    }

    pub(crate) fn publish_installed(&self, entry: &CatalogEntry) {
        let callbacks: Vec<InstalledCallback> = self
            .installed_subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(entry);
        }
        let _ = self.events.send(EngineEvent::Installed(entry.clone()));
    }

    pub(crate) fn publish_warning(&self, message: String) {
        let _ = self.events.send(EngineEvent::LogWarn { message });
    }

    fn remove(&self, target: &Target) {
        match target {
            Target::Job(key, id) => {
                let mut subscribers = self
                    .job_subscribers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if let Some(list) = subscribers.get_mut(key) {
                    list.retain(|s| s.id != *id);
                    if list.is_empty() {
                        subscribers.remove(key);
                    }
                }
            }
            Target::Installed(id) => {
                self.installed_subscribers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(sid, _)| sid != id);
            }
        }
    }
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("receivers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

enum Target {
    Job(VersionKey, u64),
    Installed(u64),
}

/// Keeps a callback registered; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    fanout: Weak<Fanout>,
    target: Target,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(fanout) = self.fanout.upgrade() {
            fanout.remove(&self.target);
        }
    }
}
