//! Scripted in-memory worker for engine tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use histo_common::model::{
    CatalogEntry, EntryStatus, InstallingRow, JobCommand, RemoteSnapshot, RemoteState,
    RemoteStatus, VersionKey,
};
use histo_common::config::PollSettings;
use histo_common::{Config, HistoError, RemoteStatusClient, Result};
use histo_core::{Catalog, InstallEngine};

/// One scripted answer to `poll`.
#[derive(Debug, Clone)]
pub enum Step {
    Status(RemoteStatus),
    Fail,
}

pub fn downloading(percent: u8) -> Step {
    Step::Status(RemoteStatus::new(RemoteState::Downloading, percent).with_bytes(
        u64::from(percent) * 10,
        1000,
    ))
}

pub fn status(state: RemoteState) -> Step {
    Step::Status(RemoteStatus::new(state, 0))
}

#[derive(Default)]
struct FakeState {
    scripts: HashMap<VersionKey, VecDeque<Step>>,
    /// Repeated once a script runs out.
    sticky: HashMap<VersionKey, Step>,
    polls: HashMap<VersionKey, usize>,
    starts: Vec<(VersionKey, bool)>,
    commands: Vec<(VersionKey, JobCommand)>,
    snapshots: usize,
    snapshot: RemoteSnapshot,
    reject_start: bool,
    fail_commands: bool,
    confirm_commands: bool,
    start_delay: Duration,
    confirm_as: HashMap<VersionKey, VersionKey>,
}

#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, key: &VersionKey, steps: Vec<Step>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(key.clone(), steps.into());
    }

    pub fn reject_starts(&self) {
        self.state.lock().unwrap().reject_start = true;
    }

    pub fn delay_starts(&self, delay: Duration) {
        self.state.lock().unwrap().start_delay = delay;
    }

    /// The worker answers a start of `requested` with `confirmed`.
    pub fn confirm_as(&self, requested: &VersionKey, confirmed: &VersionKey) {
        self.state
            .lock()
            .unwrap()
            .confirm_as
            .insert(requested.clone(), confirmed.clone());
    }

    pub fn fail_commands(&self, fail: bool) {
        self.state.lock().unwrap().fail_commands = fail;
    }

    /// Acknowledged commands change what later polls report.
    pub fn confirm_commands(&self) {
        self.state.lock().unwrap().confirm_commands = true;
    }

    pub fn list_installed(&self, entry: CatalogEntry) {
        self.state.lock().unwrap().snapshot.installed.push(entry);
    }

    pub fn list_installing(&self, key: &VersionKey, percent: u8) {
        self.state
            .lock()
            .unwrap()
            .snapshot
            .installing
            .push(InstallingRow {
                key: key.clone(),
                percent,
                bytes_done: u64::from(percent),
                bytes_total: 100,
            });
    }

    pub fn polls(&self, key: &VersionKey) -> usize {
        self.state
            .lock()
            .unwrap()
            .polls
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn starts(&self) -> Vec<(VersionKey, bool)> {
        self.state.lock().unwrap().starts.clone()
    }

    pub fn commands(&self) -> Vec<(VersionKey, JobCommand)> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn snapshot_calls(&self) -> usize {
        self.state.lock().unwrap().snapshots
    }
}

#[async_trait]
impl RemoteStatusClient for FakeRemote {
    async fn start(&self, key: &VersionKey, full_assets: bool) -> Result<VersionKey> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.starts.push((key.clone(), full_assets));
            state.start_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        if state.reject_start {
            return Err(HistoError::StartRejected {
                key: key.to_string(),
                attempts: 5,
                last_error: "API Error: worker busy".to_string(),
            });
        }
        Ok(state.confirm_as.get(key).cloned().unwrap_or_else(|| key.clone()))
    }

    async fn poll(&self, key: &VersionKey) -> Result<RemoteStatus> {
        let mut state = self.state.lock().unwrap();
        *state.polls.entry(key.clone()).or_default() += 1;
        let next = state.scripts.get_mut(key).and_then(|script| script.pop_front());
        let step = match next {
            Some(step) => {
                state.sticky.insert(key.clone(), step.clone());
                step
            }
            None => state
                .sticky
                .get(key)
                .cloned()
                .unwrap_or_else(|| status(RemoteState::Unknown)),
        };
        match step {
            Step::Status(status) => Ok(status),
            Step::Fail => Err(HistoError::TransientPoll("connection reset".to_string())),
        }
    }

    async fn send_command(&self, key: &VersionKey, command: JobCommand) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.commands.push((key.clone(), command));
        if state.fail_commands {
            return Err(HistoError::HttpError(format!(
                "HTTP error 503 Service Unavailable for URL /{command}"
            )));
        }
        if state.confirm_commands {
            let remote = match command {
                JobCommand::Pause => RemoteState::Paused,
                JobCommand::Resume => RemoteState::Downloading,
                JobCommand::Cancel => RemoteState::Cancelled,
            };
            let percent = match state.sticky.get(key) {
                Some(Step::Status(s)) => s.percent,
                _ => 0,
            };
            state.scripts.remove(key);
            state.sticky.insert(
                key.clone(),
                Step::Status(RemoteStatus::new(remote, percent)),
            );
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<RemoteSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.snapshots += 1;
        Ok(state.snapshot.clone())
    }
}

pub fn key(folder: &str) -> VersionKey {
    VersionKey::new("Release", folder).unwrap()
}

pub fn available(folder: &str) -> CatalogEntry {
    CatalogEntry::new(key(folder), folder, EntryStatus::Available)
}

/// Poll cadence the timing assertions in these tests are written against.
pub fn test_poll() -> PollSettings {
    PollSettings {
        active: Duration::from_millis(200),
        paused: Duration::from_millis(600),
        backoff: Duration::from_millis(300),
    }
}

pub fn test_config() -> Config {
    Config::for_api_url("http://127.0.0.1:9/api").with_poll_settings(test_poll())
}

pub fn engine_with(remote: &Arc<FakeRemote>, catalog: Catalog) -> InstallEngine {
    let remote: Arc<dyn RemoteStatusClient> = remote.clone();
    InstallEngine::new(remote, Arc::new(catalog), &test_config())
}

/// Lets spawned tasks run without advancing time meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
