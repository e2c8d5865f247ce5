// histo/src/cli/install.rs
use clap::Args;
use colored::Colorize;
use histo_common::config::Config;
use histo_common::error::{HistoError, Result};
use histo_common::model::VersionKey;
use histo_core::{InstallEngine, JobHandle};
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::ui;

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Version to install, e.g. `release/1.2.5`
    #[arg(value_name = "CATEGORY/FOLDER")]
    key: VersionKey,

    #[arg(long, help = "Install without the full asset set")]
    lite: bool,
}

impl InstallArgs {
    #[instrument(skip(self, config), fields(key = %self.key))]
    pub async fn run(&self, config: &Config) -> Result<()> {
        let engine = InstallEngine::from_config(config)?;
        // Re-attach to an install the worker is already running for this key.
        if let Err(e) = engine.rehydrate().await {
            warn!("Could not load worker state: {}", e);
        }

        let mut handle = engine.request_install(self.key.clone(), !self.lite).await?;
        let key = handle.key().clone();
        let pb = ui::create_install_bar(&key.to_string());
        ui::apply_job(&pb, &handle.snapshot());

        let mut interrupts = ctrl_c_presses();
        if follow(&engine, &mut handle, &pb, &mut interrupts).await == Followed::Detached {
            pb.abandon_with_message("detached");
            println!(
                "{} {} keeps installing in the background",
                "Detached:".yellow().bold(),
                key.to_string().cyan()
            );
            return Ok(());
        }

        match handle.wait().await {
            Ok(_) => {
                pb.finish_with_message("installed");
                let display = engine
                    .catalog()
                    .entry(&key)
                    .map(|entry| entry.display)
                    .unwrap_or_else(|| key.folder().to_string());
                println!(
                    "{} {} ({})",
                    "Installed".green().bold(),
                    key.to_string().cyan(),
                    display
                );
                Ok(())
            }
            Err(HistoError::RemoteCancelled(_)) => {
                pb.abandon_with_message("cancelled");
                println!("{} {}", "Cancelled".yellow().bold(), key.to_string().cyan());
                Ok(())
            }
            Err(e) => {
                pb.abandon_with_message("failed");
                Err(e)
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Followed {
    Finished,
    Detached,
}

/// Mirrors the job onto the bar until it ends. The first interrupt requests a
/// cancel; the second stops following.
async fn follow(
    engine: &InstallEngine,
    handle: &mut JobHandle,
    pb: &ProgressBar,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Followed {
    let key = handle.key().clone();
    let mut presses = 0u8;
    loop {
        tokio::select! {
            update = handle.changed() => match update {
                Some(job) => {
                    ui::apply_job(pb, &job);
                    if job.is_terminal() {
                        return Followed::Finished;
                    }
                }
                None => return Followed::Finished,
            },
            Some(()) = interrupts.recv() => {
                presses += 1;
                if presses > 1 {
                    return Followed::Detached;
                }
                if engine.request_cancel(&key) {
                    pb.set_message("cancelling… (Ctrl-C again to detach)");
                } else {
                    debug!("[{}] Nothing to cancel", key);
                }
            }
        }
    }
}

fn ctrl_c_presses() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use histo_common::model::JobCommand;
    use tokio::time::sleep;

    use super::*;
    use crate::test_remote::{key, TestRemote};

    #[tokio::test(start_paused = true)]
    async fn first_interrupt_cancels_the_install() {
        let remote = TestRemote::new();
        let engine = remote.engine();
        let mut handle = engine.request_install(key("1.0"), true).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let bar = ProgressBar::hidden();
        let (followed, _) = tokio::join!(
            follow(&engine, &mut handle, &bar, &mut rx),
            async {
                sleep(Duration::from_millis(300)).await;
                tx.send(()).unwrap();
            }
        );

        assert_eq!(followed, Followed::Finished);
        assert!(matches!(
            handle.wait().await,
            Err(HistoError::RemoteCancelled(_))
        ));
        assert_eq!(remote.commands(), vec![(key("1.0"), JobCommand::Cancel)]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_interrupt_detaches() {
        let remote = TestRemote::new();
        remote.fail_commands();
        let engine = remote.engine();
        let mut handle = engine.request_install(key("1.0"), true).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let bar = ProgressBar::hidden();
        let (followed, _) = tokio::join!(
            follow(&engine, &mut handle, &bar, &mut rx),
            async {
                sleep(Duration::from_millis(300)).await;
                tx.send(()).unwrap();
                tx.send(()).unwrap();
            }
        );

        assert_eq!(followed, Followed::Detached);
        assert!(engine.job(&key("1.0")).is_some());
    }
}
