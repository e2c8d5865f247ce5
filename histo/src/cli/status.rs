// histo/src/cli/status.rs
use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Instant;

use colored::*;
use histo_common::event::EngineEvent;
use histo_common::model::{InstallJob, JobState, VersionKey};
use tokio::sync::broadcast;

use crate::ui::format_bytes;

fn slot_indicator(state: JobState) -> String {
    match state {
        JobState::Starting => " ·".dimmed().to_string(),
        JobState::Downloading => " ↓".yellow().to_string(),
        JobState::Paused => " ‖".blue().to_string(),
        JobState::Installed => " ✓".green().bold().to_string(),
        JobState::Failed => " ✗".red().bold().to_string(),
        JobState::Cancelled => " –".dimmed().to_string(),
    }
}

fn colored_state(state: JobState) -> ColoredString {
    match state {
        JobState::Starting => state.as_str().dimmed(),
        JobState::Downloading => state.as_str().yellow(),
        JobState::Paused => state.as_str().blue(),
        JobState::Installed => state.as_str().green().bold(),
        JobState::Failed => state.as_str().red().bold(),
        JobState::Cancelled => state.as_str().dimmed(),
    }
}

struct JobRow {
    job: InstallJob,
    pool_id: usize,
    finished: bool,
}

impl JobRow {
    fn size_str(&self) -> String {
        let progress = &self.job.progress;
        if progress.is_indeterminate() {
            "–".to_string()
        } else {
            format_bytes(progress.bytes_total)
        }
    }
}

struct StatusDisplay {
    rows: HashMap<VersionKey, JobRow>,
    row_order: Vec<VersionKey>,
    next_pool_id: usize,
    start_time: Instant,
    header_printed: bool,
    last_line_count: usize,
}

impl StatusDisplay {
    fn new() -> Self {
        Self {
            rows: HashMap::new(),
            row_order: Vec::new(),
            next_pool_id: 1,
            start_time: Instant::now(),
            header_printed: false,
            last_line_count: 0,
        }
    }

    fn upsert(&mut self, job: InstallJob) {
        match self.rows.get_mut(&job.key) {
            Some(row) => {
                // Snapshots can arrive out of order on the broadcast bus.
                if job.revision >= row.job.revision {
                    if !job.is_terminal() {
                        row.finished = false;
                    }
                    row.job = job;
                }
            }
            None => {
                self.row_order.push(job.key.clone());
                self.rows.insert(
                    job.key.clone(),
                    JobRow {
                        job,
                        pool_id: self.next_pool_id,
                        finished: false,
                    },
                );
                self.next_pool_id += 1;
            }
        }
    }

    fn finish(&mut self, key: &VersionKey) {
        if let Some(row) = self.rows.get_mut(key) {
            row.finished = true;
        }
    }

    fn active(&self) -> usize {
        self.rows.values().filter(|row| !row.finished).count()
    }

    fn count(&self, state: JobState) -> usize {
        self.rows.values().filter(|row| row.job.state == state).count()
    }

    fn render(&mut self) {
        if self.header_printed {
            self.clear_previous_output();
        }
        self.print_header();
        let job_output = self.build_job_rows();
        print!("{job_output}");
        self.header_printed = true;
        // header + jobs + separator + summary
        self.last_line_count = 1 + job_output.lines().count() + 1 + 1;

        println!("{}", "─".repeat(56).dimmed());
        println!(
            "{} {}",
            self.generate_progress_bar(),
            format!("{} active", self.active()).blue()
        );

        let _ = io::stdout().flush();
    }

    fn print_header(&self) {
        println!(
            "{:<6} {:<12} {:<20} {:>5} {:>8} {}",
            "IID".bold().dimmed(),
            "STATE".bold().dimmed(),
            "VERSION".bold().dimmed(),
            "PCT".bold().dimmed(),
            "SIZE".bold().dimmed(),
            "SLOT".bold().dimmed()
        );
    }

    fn build_job_rows(&self) -> String {
        let mut output = String::new();
        for key in &self.row_order {
            if let Some(row) = self.rows.get(key) {
                output.push_str(&format!(
                    "{:<6} {:<12} {:<20} {:>4}% {:>8} {}\n",
                    format!("#{:02}", row.pool_id).cyan(),
                    colored_state(row.job.state),
                    row.job.key.to_string().cyan(),
                    row.job.progress.percent,
                    row.size_str(),
                    slot_indicator(row.job.state)
                ));
            }
        }
        output
    }

    fn clear_previous_output(&self) {
        for _ in 0..self.last_line_count {
            print!("\x1b[1A\x1b[2K");
        }
        let _ = io::stdout().flush();
    }

    fn generate_progress_bar(&self) -> String {
        let total = self.rows.len();
        if total == 0 {
            return String::new();
        }
        let progress_width = 8;
        let filled = ((total - self.active()) * progress_width) / total;
        let remaining = progress_width - filled;
        format!(
            "{}{}",
            "▍".repeat(filled).green(),
            "·".repeat(remaining).dimmed()
        )
    }
}

/// Renders engine events until every job in view has finished.
pub async fn handle_events(mut event_rx: broadcast::Receiver<EngineEvent>, initial: Vec<InstallJob>) {
    let mut display = StatusDisplay::new();
    let mut logs_buffer = Vec::new();
    for job in initial {
        display.upsert(job);
    }
    display.render();

    while display.active() > 0 {
        match event_rx.recv().await {
            Ok(event) => match event {
                EngineEvent::JobUpdated(job) => {
                    display.upsert(job);
                    display.render();
                }
                EngineEvent::JobRemoved { key } => {
                    display.finish(&key);
                    display.render();
                }
                EngineEvent::Installed(entry) => {
                    logs_buffer.push(format!(
                        "{}: {} ({})",
                        "Installed".green(),
                        entry.key.to_string().cyan(),
                        entry.display
                    ));
                }
                EngineEvent::LogWarn { message } => {
                    logs_buffer.push(message.yellow().to_string());
                }
            },
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }

    for key in &display.row_order {
        if let Some(row) = display.rows.get(key) {
            if row.job.state == JobState::Failed {
                logs_buffer.push(format!(
                    "{} {}: {}",
                    "✗".red().bold(),
                    key.to_string().cyan(),
                    row.job
                        .last_error
                        .as_deref()
                        .unwrap_or("install failed")
                        .red()
                ));
            }
        }
    }

    println!();
    if !logs_buffer.is_empty() {
        for log in &logs_buffer {
            println!("{log}");
        }
        println!();
    }

    println!(
        "{}: {}  {}: {}  {}: {}  {}: {}  {}: {:.2}s",
        "Total jobs".bold(),
        display.rows.len(),
        "Installed".green().bold(),
        display.count(JobState::Installed),
        "Failed".red().bold(),
        display.count(JobState::Failed),
        "Cancelled".bold(),
        display.count(JobState::Cancelled),
        "Elapsed".bold(),
        display.start_time.elapsed().as_secs_f64()
    );
}
