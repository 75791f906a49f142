//! Plain-text rendering of the view model for the terminal.

use tracker_core::{AppViewModel, JobRowView, JobStatus, Notification, NotificationLevel};

pub fn notification_line(notification: &Notification) -> String {
    let tag = match notification.level {
        NotificationLevel::Info => "info",
        NotificationLevel::Success => "done",
        NotificationLevel::Error => "error",
    };
    format!("[{tag}] {}: {}", notification.job_id, notification.message)
}

pub fn job_line(row: &JobRowView) -> String {
    let status = match row.status {
        JobStatus::Idle => "idle".to_string(),
        JobStatus::Pending => "pending".to_string(),
        JobStatus::Processing => format!("processing {:>3}%", row.progress),
        JobStatus::Completed => "completed".to_string(),
        JobStatus::Failed => "failed".to_string(),
    };
    let detail = row
        .result_url
        .as_deref()
        .or(row.error.as_deref())
        .unwrap_or("");
    format!(
        "{:<24} {:<6} {:<16} {}",
        row.job_id.as_str(),
        row.kind.as_str(),
        status,
        detail
    )
    .trim_end()
    .to_string()
}

pub fn summary(view: &AppViewModel) -> Vec<String> {
    let mut lines = Vec::new();
    if view.jobs.is_empty() {
        lines.push("no tracked jobs".to_string());
    } else {
        lines.push(format!(
            "{} jobs, {} in flight",
            view.jobs.len(),
            view.active_count
        ));
        lines.extend(view.jobs.iter().map(job_line));
    }
    if !view.media.is_empty() {
        lines.push(format!("{} generated media:", view.media.len()));
        lines.extend(
            view.media
                .iter()
                .rev()
                .map(|media| format!("  {} {} {}", media.job_id, media.kind.as_str(), media.url)),
        );
    }
    lines
}
