// histo/src/cli/command.rs
use std::time::Duration;

use clap::Args;
use colored::Colorize;
use histo_common::config::Config;
use histo_common::error::{HistoError, Result};
use histo_common::event::EngineEvent;
use histo_common::model::{JobCommand, JobState, VersionKey};
use histo_core::{InstallEngine, JobHandle};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::debug;

use crate::ui;

/// Confirmation can take a few paused-cadence polls after the request itself.
const CONFIRM_POLLS: u32 = 4;

#[derive(Debug, Args)]
pub struct JobCommandArgs {
    /// Install to act on, e.g. `release/1.2.5`
    #[arg(value_name = "CATEGORY/FOLDER")]
    key: VersionKey,
}

impl JobCommandArgs {
    pub async fn run(&self, config: &Config, command: JobCommand) -> Result<()> {
        let engine = InstallEngine::from_config(config)?;
        engine.rehydrate().await?;

        let spinner = ui::create_spinner(
            &self.key.to_string(),
            &format!("waiting for the worker to {command}"),
        );
        let deadline = config.request_timeout + config.poll.paused * CONFIRM_POLLS;
        let result = execute(&engine, &self.key, command, deadline).await;
        spinner.finish_and_clear();
        engine.shutdown();

        let state = result?;
        println!(
            "{} {} is {}",
            "Done:".green().bold(),
            self.key.to_string().cyan(),
            state
        );
        Ok(())
    }
}

/// Issues `command` for a tracked job and waits until the worker confirms it,
/// the engine drops it, or the job ends.
pub(crate) async fn execute(
    engine: &InstallEngine,
    key: &VersionKey,
    command: JobCommand,
    deadline: Duration,
) -> Result<JobState> {
    let Some(mut handle) = engine.handle(key) else {
        return Err(HistoError::NotFound(format!(
            "no install of '{key}' in progress"
        )));
    };

    // A rehydrated job is only a guess until the worker has answered once.
    if timeout(deadline, handle.settled()).await.is_err() {
        debug!(
            "[{}] No poll answer within {:?}, using the rehydrated state",
            key, deadline
        );
    }

    let mut events = engine.events();
    let state = handle.snapshot().state;
    let issued = match command {
        JobCommand::Pause => engine.request_pause(key),
        JobCommand::Resume => engine.request_resume(key),
        JobCommand::Cancel => engine.request_cancel(key),
    };
    if !issued {
        return Err(HistoError::Api(format!(
            "cannot {command} '{key}' while it is {state}"
        )));
    }

    timeout(deadline, wait_for_outcome(&mut handle, &mut events, command))
        .await
        .map_err(|_| {
            HistoError::Api(format!(
                "timed out after {deadline:?} waiting for {command} of '{key}'"
            ))
        })?
}

/// Follows the job until the pending command is resolved or the job ends.
async fn wait_for_outcome(
    handle: &mut JobHandle,
    events: &mut broadcast::Receiver<EngineEvent>,
    command: JobCommand,
) -> Result<JobState> {
    let key = handle.key().clone();
    let failure = format!("{command} of {key} failed");
    loop {
        tokio::select! {
            update = handle.changed() => {
                let Some(job) = update else {
                    return Err(HistoError::NotFound(format!(
                        "install of '{key}' is no longer tracked"
                    )));
                };
                if job.is_terminal() {
                    return Ok(job.state);
                }
                if job.pending_command.is_none() {
                    if job.state == command.target_state() {
                        return Ok(job.state);
                    }
                    return Err(HistoError::Api(format!(
                        "{} was not confirmed; worker reports {}",
                        command, job.state
                    )));
                }
            }
            event = events.recv() => match event {
                Ok(EngineEvent::LogWarn { message }) if message.starts_with(&failure) => {
                    return Err(HistoError::Api(message));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Status stream lagged by {} event(s)", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(HistoError::Api("engine stopped".to_string()));
                }
            }
        }
    }
}
