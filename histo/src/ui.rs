// histo/src/ui.rs
//! Progress bar helpers for the install command.

use histo_common::model::{InstallJob, JobState};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{prefix:.cyan.bold} [{bar:30.green/dim}] {pos:>3}% {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.blue.bold} {prefix:.cyan.bold} {msg}";

/// A percent-based bar for one install.
pub fn create_install_bar(label: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb.set_prefix(label.to_string());
    pb
}

/// A spinner used while waiting on the worker.
pub fn create_spinner(label: &str, message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(label.to_string());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Mirrors a job snapshot onto the bar.
pub fn apply_job(pb: &ProgressBar, job: &InstallJob) {
    pb.set_position(u64::from(job.progress.percent));
    pb.set_message(job_message(job));
}

fn job_message(job: &InstallJob) -> String {
    let mut parts = vec![job.state.to_string()];
    if let Some(stage) = &job.progress.stage {
        parts.push(stage.clone());
    }
    if !job.progress.is_indeterminate() {
        parts.push(format!(
            "{} / {}",
            format_bytes(job.progress.bytes_done),
            format_bytes(job.progress.bytes_total)
        ));
    }
    if job.state == JobState::Paused && job.pending_command.is_some() {
        parts.push("(pausing)".to_string());
    }
    parts.join(" · ")
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "kB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit_idx = 0;

    while value >= 1000.0 && unit_idx < UNITS.len() - 1 {
        value /= 1000.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{bytes}B")
    } else {
        format!("{:.1}{}", value, UNITS[unit_idx])
    }
}
