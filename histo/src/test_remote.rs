// histo/src/test_remote.rs
//! A scripted worker for driving the commands without a server.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use histo_common::model::{
    InstallingRow, JobCommand, RemoteSnapshot, RemoteState, RemoteStatus, VersionKey,
};
use histo_common::{Config, HistoError, PollSettings, RemoteStatusClient, Result};
use histo_core::{Catalog, InstallEngine};

#[derive(Default)]
struct State {
    statuses: HashMap<VersionKey, RemoteStatus>,
    installing: Vec<InstallingRow>,
    commands: Vec<(VersionKey, JobCommand)>,
    fail_commands: bool,
}

/// Reports a fixed status per key; acknowledged commands change it.
#[derive(Default)]
pub struct TestRemote {
    state: Mutex<State>,
}

impl TestRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Lists `key` as in flight on `/initial` and reports `state` for it.
    pub fn running(&self, key: &VersionKey, state: RemoteState, percent: u8) {
        let mut guard = self.state.lock().unwrap();
        guard
            .statuses
            .insert(key.clone(), RemoteStatus::new(state, percent));
        guard.installing.push(InstallingRow {
            key: key.clone(),
            percent,
            bytes_done: 0,
            bytes_total: 0,
        });
    }

    pub fn fail_commands(&self) {
        self.state.lock().unwrap().fail_commands = true;
    }

    pub fn commands(&self) -> Vec<(VersionKey, JobCommand)> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn engine(self: &Arc<Self>) -> InstallEngine {
        let config = Config::for_api_url("http://127.0.0.1:9/api").with_poll_settings(PollSettings {
            active: Duration::from_millis(200),
            paused: Duration::from_millis(600),
            backoff: Duration::from_millis(300),
        });
        let remote: Arc<dyn RemoteStatusClient> = self.clone();
        InstallEngine::new(remote, Arc::new(Catalog::new()), &config)
    }
}

#[async_trait]
impl RemoteStatusClient for TestRemote {
    async fn start(&self, key: &VersionKey, _full_assets: bool) -> Result<VersionKey> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .entry(key.clone())
            .or_insert_with(|| RemoteStatus::new(RemoteState::Downloading, 0));
        Ok(key.clone())
    }

    async fn poll(&self, key: &VersionKey) -> Result<RemoteStatus> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .statuses
            .get(key)
            .cloned()
            .unwrap_or_else(|| RemoteStatus::new(RemoteState::Unknown, 0)))
    }

    async fn send_command(&self, key: &VersionKey, command: JobCommand) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.commands.push((key.clone(), command));
        if state.fail_commands {
            return Err(HistoError::HttpError(format!(
                "HTTP error 503 Service Unavailable for URL /{command}"
            )));
        }
        let next = match command {
            JobCommand::Pause => RemoteState::Paused,
            JobCommand::Resume => RemoteState::Downloading,
            JobCommand::Cancel => RemoteState::Cancelled,
        };
        let percent = state.statuses.get(key).map_or(0, |s| s.percent);
        state
            .statuses
            .insert(key.clone(), RemoteStatus::new(next, percent));
        Ok(())
    }

    async fn snapshot(&self) -> Result<RemoteSnapshot> {
        Ok(RemoteSnapshot {
            installing: self.state.lock().unwrap().installing.clone(),
            installed: Vec::new(),
        })
    }
}

pub fn key(folder: &str) -> VersionKey {
    VersionKey::new("Release", folder).unwrap()
}
