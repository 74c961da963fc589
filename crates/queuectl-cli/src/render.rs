//! Plain-text tables for `list`, `dlq list` and `status`.

use std::fmt::Write;

use queuectl_core::{JobRecord, JobStats};

const COMMAND_WIDTH: usize = 30;

/// Shorten to `width` chars, marking the cut with "...".
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn updated(job: &JobRecord) -> String {
    job.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn job_table(jobs: &[JobRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<20} {:<12} {:<30} {:<10} {:<20}",
        "ID", "State", "Command", "Attempts", "Updated"
    );
    let _ = writeln!(out, "{}", "=".repeat(96));
    for job in jobs {
        let _ = writeln!(
            out,
            "{:<20} {:<12} {:<30} {:<10} {:<20}",
            job.id.as_str(),
            job.state.as_str(),
            truncate(&job.command, COMMAND_WIDTH),
            job.attempts,
            updated(job)
        );
    }
    out
}

pub fn dlq_table(jobs: &[JobRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<20} {:<30} {:<10} {:<20} Error",
        "ID", "Command", "Attempts", "Updated"
    );
    let _ = writeln!(out, "{}", "=".repeat(96));
    for job in jobs {
        let _ = writeln!(
            out,
            "{:<20} {:<30} {:<10} {:<20} {}",
            job.id.as_str(),
            truncate(&job.command, COMMAND_WIDTH),
            job.attempts,
            updated(job),
            job.error_message.as_deref().unwrap_or("").trim_end()
        );
    }
    out
}

pub fn status(stats: &JobStats, workers: &[u32]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Job states:");
    let _ = writeln!(out, "  Pending:    {}", stats.pending);
    let _ = writeln!(out, "  Processing: {}", stats.processing);
    let _ = writeln!(out, "  Completed:  {}", stats.completed);
    let _ = writeln!(out, "  Failed:     {}", stats.failed);
    let _ = writeln!(out, "  Dead (DLQ): {}", stats.dead);
    let _ = writeln!(out, "  Total:      {}", stats.total);
    let _ = writeln!(out);
    if workers.is_empty() {
        let _ = writeln!(out, "Active workers: 0");
    } else {
        let pids: Vec<String> = workers.iter().map(u32::to_string).collect();
        let _ = writeln!(
            out,
            "Active workers: {} (PID: {})",
            workers.len(),
            pids.join(", ")
        );
    }
    out
}
