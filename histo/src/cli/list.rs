// histo/src/cli/list.rs
use clap::Args;
use colored::Colorize;
use histo_common::config::Config;
use histo_common::error::Result;
use histo_core::InstallEngine;
use prettytable::{format, Cell, Row, Table};

use crate::ui::format_bytes;

#[derive(Args, Debug)]
pub struct List {
    /// Only show installed versions
    #[arg(long)]
    pub installed: bool,
}

impl List {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let engine = InstallEngine::from_config(config)?;
        engine.rehydrate().await?;
        let jobs = if self.installed {
            Vec::new()
        } else {
            engine.jobs()
        };
        // Nothing to follow here.
        engine.shutdown();

        let mut installed = engine.catalog().installed();
        installed.sort_by(|a, b| a.key.cmp(&b.key));

        if installed.is_empty() && jobs.is_empty() {
            println!("{}", "0 versions installed".yellow());
            return Ok(());
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.add_row(Row::new(vec![
            Cell::new("Category").style_spec("b"),
            Cell::new("Version").style_spec("b"),
            Cell::new("Name").style_spec("b"),
            Cell::new("Size").style_spec("b"),
            Cell::new("Status").style_spec("b"),
        ]));
        for entry in &installed {
            table.add_row(Row::new(vec![
                Cell::new(entry.category()).style_spec("Fg"),
                Cell::new(entry.folder()).style_spec("Fb"),
                Cell::new(&entry.display),
                Cell::new(&entry.size_hint.map(format_bytes).unwrap_or_default()),
                Cell::new("installed"),
            ]));
        }
        for job in &jobs {
            table.add_row(Row::new(vec![
                Cell::new(job.key.category()).style_spec("Fy"),
                Cell::new(job.key.folder()).style_spec("Fb"),
                Cell::new(""),
                Cell::new(&if job.progress.is_indeterminate() {
                    String::new()
                } else {
                    format_bytes(job.progress.bytes_total)
                }),
                Cell::new(&format!("{} {}%", job.state, job.progress.percent)),
            ]));
        }
        table.printstd();

        let mut summary = format!("{} versions installed", installed.len());
        if !jobs.is_empty() {
            summary.push_str(&format!(", {} in progress", jobs.len()));
        }
        println!("{}", summary.bold());
        Ok(())
    }
}
