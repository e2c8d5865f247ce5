// histo/src/cli/watch.rs
use clap::Args;
use colored::Colorize;
use histo_common::config::Config;
use histo_common::error::Result;
use histo_core::InstallEngine;
use tracing::debug;

use crate::cli::status;

#[derive(Args, Debug)]
pub struct Watch {}

impl Watch {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let engine = InstallEngine::from_config(config)?;
        // Subscribe first so no update between rehydrate and render is lost.
        let events = engine.events();
        let handles = engine.rehydrate().await?;
        if handles.is_empty() {
            println!("{}", "No installs in progress".yellow());
            return Ok(());
        }

        tokio::select! {
            _ = status::handle_events(events, engine.jobs()) => {}
            _ = tokio::signal::ctrl_c() => {
                println!();
                debug!("Watch interrupted; installs continue on the worker.");
            }
        }
        engine.shutdown();
        Ok(())
    }
}
