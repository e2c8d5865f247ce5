// histo/src/cli.rs
//! Defines the command-line argument structure using clap.
use clap::{ArgAction, Parser, Subcommand};
use histo_common::error::Result;
use histo_common::model::JobCommand;
use histo_common::Config;

pub mod command;
pub mod install;
pub mod list;
pub mod status;
pub mod watch;

use crate::cli::command::JobCommandArgs;
use crate::cli::install::InstallArgs;
use crate::cli::list::List;
use crate::cli::watch::Watch;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "histo", bin_name = "histo")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a version and follow its progress
    Install(InstallArgs),
    /// Follow every install the worker is running
    Watch(Watch),
    /// Pause a running install
    Pause(JobCommandArgs),
    /// Resume a paused install
    Resume(JobCommandArgs),
    /// Cancel an install
    Cancel(JobCommandArgs),
    /// List installed versions and installs in progress
    List(List),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config).await,
            Self::Watch(command) => command.run(config).await,
            Self::Pause(command) => command.run(config, JobCommand::Pause).await,
            Self::Resume(command) => command.run(config, JobCommand::Resume).await,
            Self::Cancel(command) => command.run(config, JobCommand::Cancel).await,
            Self::List(command) => command.run(config).await,
        }
    }
}
